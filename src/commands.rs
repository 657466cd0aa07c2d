//! Subcommands of the `dq` binary that do not run queries.

pub mod generate;
