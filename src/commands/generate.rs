//! `generate` subcommand: shell completions and man pages.
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write completions for `shell` to `writer`.
pub fn write_completions<W: Write>(
    shell: clap_complete::Shell,
    cmd: &mut clap::Command,
    writer: &mut W,
) {
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, cmd, name, writer);
}

/// Render man pages for `cmd` and every nested subcommand into `output_dir`
/// (the current directory when `None`), returning the written paths.
///
/// Subcommand pages are named `<parent>-<sub>.1`.
///
/// # Errors
///
/// Returns an error if the directory or a page cannot be written.
pub fn generate_man_pages(
    cmd: &clap::Command,
    output_dir: Option<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let output_dir = match output_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Opening current directory")?,
    };
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("failed to create {}", output_dir.display())
    })?;

    let mut written = Vec::new();
    render_page(cmd.clone(), &output_dir, &mut written)?;
    Ok(written)
}

fn render_page(
    cmd: clap::Command,
    output_dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let name = cmd.get_name().to_string();
    let path = output_dir.join(format!("{name}.1"));
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    clap_mangen::Man::new(cmd.clone())
        .render(&mut file)
        .with_context(|| format!("failed to render {}", path.display()))?;
    log::debug!("wrote man page {}", path.display());
    written.push(path);

    for sub in cmd.get_subcommands() {
        // clap only accepts a 'static name; the leak is bounded by the
        // number of subcommands.
        let full: &'static str =
            Box::leak(format!("{name}-{}", sub.get_name()).into_boxed_str());
        let renamed = sub.clone().name(full).disable_help_subcommand(true);
        render_page(renamed, output_dir, written)?;
    }
    Ok(())
}
