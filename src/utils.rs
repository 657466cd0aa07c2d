//! Miscellaneous utility functions.

use anyhow::Context as _;
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use std::io::{self, ErrorKind};

// ==============================================================================
// Colorized JSON Output
// ==============================================================================

/// Write one JSON value, colorized, followed by a newline. A broken pipe is
/// treated as success so that piping into `head` exits cleanly.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub fn write_colored_value<W: Write>(
    writer: &mut W,
    value: &Value,
    pretty: bool,
) -> anyhow::Result<()> {
    let result = write_colored_json(writer, value, 0, pretty)
        .and_then(|()| writeln!(writer));

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err).context("write colorized JSON to stdout"),
    }
}

fn write_indent<W: Write>(writer: &mut W, width: usize) -> io::Result<()> {
    writeln!(writer)?;
    write!(writer, "{:width$}", "")
}

fn write_quoted<W: Write>(writer: &mut W, s: &str, key: bool) -> io::Result<()> {
    // Re-serialize to get proper JSON escaping and quoting.
    let quoted = serde_json::to_string(s).map_err(io::Error::other)?;
    if key {
        write!(writer, "{}", quoted.cyan())
    } else {
        write!(writer, "{}", quoted.green())
    }
}

/// Recursively write a JSON value with syntax highlighting.
fn write_colored_json<W: Write>(
    writer: &mut W,
    value: &Value,
    indent: usize,
    pretty: bool,
) -> io::Result<()> {
    let next_indent = indent + 2;

    match value {
        Value::Null => write!(writer, "{}", "null".red().dimmed()),
        Value::Bool(b) => write!(writer, "{}", b.to_string().yellow().bold()),
        Value::Number(n) => write!(writer, "{}", n.to_string().yellow()),
        Value::String(s) => write_quoted(writer, s, false),
        Value::Array(arr) => {
            write!(writer, "[")?;
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    write!(writer, ",")?;
                }
                if pretty {
                    write_indent(writer, next_indent)?;
                }
                write_colored_json(writer, item, next_indent, pretty)?;
            }
            if pretty && !arr.is_empty() {
                write_indent(writer, indent)?;
            }
            write!(writer, "]")
        }
        Value::Object(obj) => {
            write!(writer, "{{")?;
            for (i, (key, val)) in obj.iter().enumerate() {
                if i > 0 {
                    write!(writer, ",")?;
                }
                if pretty {
                    write_indent(writer, next_indent)?;
                }
                write_quoted(writer, key, true)?;
                write!(writer, "{}", if pretty { ": " } else { ":" })?;
                write_colored_json(writer, val, next_indent, pretty)?;
            }
            if pretty && !obj.is_empty() {
                write_indent(writer, indent)?;
            }
            write!(writer, "}}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: &Value, pretty: bool) -> String {
        colored::control::set_override(false);
        let mut out = Vec::new();
        write_colored_value(&mut out, value, pretty).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn compact_output_is_json() {
        let value = json!({"item": "a\"b", "tags": [1, null, true], "e": {}});
        let text = render(&value, false);
        assert_eq!(serde_json::from_str::<Value>(text.trim()).unwrap(), value);
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn pretty_output_matches_serde() {
        let value = json!({"a": [1, 2], "b": {"c": "d"}, "e": []});
        let text = render(&value, true);
        assert_eq!(text.trim_end(), serde_json::to_string_pretty(&value).unwrap());
    }
}
