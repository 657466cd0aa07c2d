//! # Query Model
//!
//! MongoDB-style query objects over JSON documents:
//! - Implicit equality: `{"item": "journal"}`
//! - Field operators: `{"qty": {"$gte": 10, "$lt": 50}}`
//! - Nested path maps: `{"size": {"h": 14, "uom": "cm"}}`
//! - Logical roots: `$and`, `$or`, `$nor` and `$not`
//! - Dot/bracket field paths with auto-flattening over arrays
//!
//! Queries are parsed once into a [`Query`] tree and then matched against
//! any number of documents by an [`Evaluator`].

pub mod ast;
pub mod evaluator;

// Re-exports
pub use ast::{Clause, Condition, Logical, LogicalOperator, Query};
pub use evaluator::{Context, Evaluator};
