/*!
# `docquery` Library

In-memory querying of JSON document collections with MongoDB-style
condition trees.

```rust
use docquery::{QueryEngine, QueryOptions};
use serde_json::json;

let engine = QueryEngine::from_json(
    json!([
        {"item": "journal", "instock": [{"wh": "A", "qty": 5}, {"wh": "C", "qty": 15}]},
        {"item": "notebook", "instock": [{"wh": "C", "qty": 5}]}
    ]),
    QueryOptions::new(),
)
.unwrap();

let found = engine.find(&json!({"instock.qty": 15})).unwrap();
assert_eq!(found.len(), 1);
assert_eq!(found[0]["item"], "journal");
```

The library only emits [`log`] records; installing a logger is left to the
application.
*/

pub mod cache;
pub mod commands;
pub mod engine;
pub mod error;
pub mod formats;
pub mod operators;
pub mod path;
pub mod query;
pub mod utils;
pub mod value;

// Re-exports
pub use cache::{CacheStats, ResultCache};
pub use engine::{QueryEngine, QueryOptions};
pub use error::QueryError;
pub use operators::{Operator, OperatorRegistry};
pub use path::{resolve, resolve_flat};
pub use query::{Condition, Context, Evaluator, Query};
