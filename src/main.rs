/*!
Main binary for docquery.
*/

use anyhow::{Context, Result, bail};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use serde_json::Value;
use std::fs;
use std::io::{self, IsTerminal, Read, Write, stdout};
use std::path::PathBuf;

use docquery::{
    QueryEngine, QueryError, QueryOptions, cache::DEFAULT_CAPACITY, commands,
    formats::Format, resolve, utils::write_colored_value, value::describe,
};

/// Query a collection of JSON documents with a MongoDB-style query object.
#[derive(Parser)]
#[command(name = "dq", version, about, arg_required_else_help = true, long_about = None, disable_help_subcommand = true)]
struct Args {
    /// Optional subcommands
    #[command(subcommand)]
    command: Option<Commands>,
    /// Query object as JSON (e.g., '{"qty": {"$gt": 10}}')
    query: Option<String>,
    #[arg(value_name = "FILE")]
    /// Optional path to the collection file. If omitted, reads from STDIN
    input: Option<PathBuf>,
    /// Input format; guessed from the file extension when omitted
    #[arg(short, long, value_enum)]
    format: Option<Format>,
    /// Field path of the collection array inside the input (e.g., "data.items")
    #[arg(long, value_name = "PATH")]
    root: Option<String>,
    /// Print only the first matching document
    #[arg(long, action = ArgAction::SetTrue)]
    first: bool,
    /// Print whether each document matches instead of the matches
    #[arg(short, long, action = ArgAction::SetTrue, conflicts_with_all = ["first", "count"])]
    evaluate: bool,
    /// Print the number of matching documents
    #[arg(short, long, action = ArgAction::SetTrue, conflicts_with = "first")]
    count: bool,
    /// Do not pretty-print the JSON output, instead use compact
    #[arg(long, action = ArgAction::SetTrue)]
    compact: bool,
    /// Disable colored output
    #[arg(long, action = ArgAction::SetTrue)]
    no_color: bool,
    /// Memoize the results of an operator (repeatable, e.g. --cache '$regex')
    #[arg(long = "cache", value_name = "OPERATOR")]
    cache: Vec<String>,
    /// Maximum number of memoized results per cached operator
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CAPACITY)]
    cache_capacity: usize,
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

/// Available subcommands for `dq`
#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    /// Generate additional documentation and/or completions
    Generate(GenerateCommand),
}

/// Generate shell completions and man page
#[derive(Subcommand)]
enum GenerateCommand {
    /// Generate shell completions for the given shell to stdout.
    Shell { shell: clap_complete::Shell },
    /// Generate a man page for dq to output directory if specified, else
    /// the current directory.
    Man {
        /// The output directory to write the man pages.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Read the raw input bytes from `input`, or from STDIN when omitted.
///
/// Returns `None` when STDIN is an interactive terminal.
fn read_input(input: Option<&PathBuf>) -> Result<Option<Vec<u8>>> {
    if let Some(path) = input {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        return Ok(Some(bytes));
    }

    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read STDIN")?;
    Ok(Some(buffer))
}

/// Entry point for main binary.
///
/// This parses the command line arguments, loads the collection and runs
/// the query. Output goes to STDOUT; diagnostics go through the logger to
/// STDERR.
fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    if args.no_color || !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    match args.command {
        Some(Commands::Generate(cmd)) => match cmd {
            GenerateCommand::Shell { shell } => {
                commands::generate::write_completions(
                    shell,
                    &mut Args::command(),
                    &mut stdout().lock(),
                );
            }
            GenerateCommand::Man { output_dir } => {
                for path in commands::generate::generate_man_pages(
                    &Args::command(),
                    output_dir,
                )? {
                    println!("Generated: {}", path.display());
                }
            }
        },
        None => run_query(&args)?,
    }

    Ok(())
}

fn run_query(args: &Args) -> Result<()> {
    let query: Value = serde_json::from_str(
        args.query.as_deref().ok_or_else(|| {
            anyhow::anyhow!("Query required unless using subcommand")
        })?,
    )
    .context("Failed to parse query as JSON")?;

    let Some(input) = read_input(args.input.as_ref())? else {
        // No piped input and no file specified
        let mut cmd = Args::command();
        return Ok(cmd.print_help()?);
    };
    let format = args
        .format
        .or_else(|| args.input.as_deref().and_then(Format::from_path))
        .unwrap_or_default();
    log::debug!("reading input as {format}");
    let document = format.parse(&input)?;

    let collection = match &args.root {
        Some(root) => resolve(&document, root).with_context(|| {
            format!("Root path {root:?} not found in input")
        })?,
        None => &document,
    };
    let Some(records) = collection.as_array() else {
        return Err(QueryError::InvalidCollection(describe(collection)))
            .context("Input is not a collection; use --root to select one");
    };

    let options = args
        .cache
        .iter()
        .fold(QueryOptions::new(), |options, name| options.cache_operator(name))
        .cache_capacity(args.cache_capacity);
    let engine = QueryEngine::create(records, options)
        .context("Failed to set up query engine")?;

    let pretty = !args.compact;
    let mut out = stdout().lock();
    if args.evaluate {
        let results = engine.evaluate(&query).context("Query failed")?;
        let results = Value::from(results);
        write_colored_value(&mut out, &results, pretty)?;
    } else if args.first {
        if let Some(found) = engine.find_one(&query).context("Query failed")? {
            write_colored_value(&mut out, found, pretty)?;
        }
    } else {
        let found = engine.find(&query).context("Query failed")?;
        if args.count {
            if let Err(err) = writeln!(out, "{}", found.len()) {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    bail!(err);
                }
            }
        } else {
            for document in found {
                write_colored_value(&mut out, document, pretty)?;
            }
        }
    }

    for (name, cache) in engine.caches() {
        log::debug!("cache {name}: {:?}", cache.stats());
    }
    Ok(())
}
