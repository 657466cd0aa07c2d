/*!
# Query Engine

[`QueryEngine`] pins a collection of documents together with its own
[`OperatorRegistry`] and answers queries over it.

```rust
use docquery::{QueryEngine, QueryOptions};
use serde_json::json;

let engine = QueryEngine::from_json(
    json!([{"qty": 5}, {"qty": 10}, {"qty": 15}]),
    QueryOptions::new(),
)
.unwrap();

let found = engine.find(&json!({"qty": {"$gt": 10}})).unwrap();
assert_eq!(found, vec![&json!({"qty": 15})]);
assert_eq!(
    engine.evaluate(&json!({"qty": {"$lte": 5}})).unwrap(),
    vec![true, false, false]
);
```

Custom operators are supplied through [`QueryOptions`] or registered later:

```rust
use docquery::{Context, QueryEngine, QueryOptions};
use serde_json::{Value, json};

let options = QueryOptions::new().operator(
    "$even",
    |value: Option<&Value>, _: &Value, _: &Context<'_>| {
        Ok(value.and_then(Value::as_i64).is_some_and(|n| n % 2 == 0))
    },
);
let engine = QueryEngine::create(vec![json!({"n": 1}), json!({"n": 2})], options).unwrap();
assert_eq!(engine.find(&json!({"n": {"$even": true}})).unwrap().len(), 1);
```
*/
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::cache::{DEFAULT_CAPACITY, ResultCache};
use crate::error::{QueryError, Result};
use crate::operators::{Operator, OperatorRegistry};
use crate::query::{Context, Evaluator, Query};
use crate::value::describe;

/// Source of per-engine identity scopes for cache keys.
static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Construction options for a [`QueryEngine`].
#[derive(Clone)]
pub struct QueryOptions {
    operators: Vec<(String, Arc<dyn Operator>)>,
    cached: Vec<String>,
    cache_capacity: usize,
}

impl QueryOptions {
    /// Options with only the built-in operators and no caching.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
            cached: Vec::new(),
            cache_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Add or override operator `name`. The name is validated when the
    /// engine is created.
    #[must_use]
    pub fn operator<F>(mut self, name: impl Into<String>, operator: F) -> Self
    where
        F: Fn(Option<&Value>, &Value, &Context<'_>) -> Result<bool>
            + Send
            + Sync
            + 'static,
    {
        self.operators.push((name.into(), Arc::new(operator)));
        self
    }

    /// Add or override operator `name` with a shared operator object.
    #[must_use]
    pub fn operator_object(
        mut self,
        name: impl Into<String>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        self.operators.push((name.into(), operator));
        self
    }

    /// Memoize the results of operator `name`.
    #[must_use]
    pub fn cache_operator(mut self, name: impl Into<String>) -> Self {
        self.cached.push(name.into());
        self
    }

    /// Capacity of each operator cache.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> =
            self.operators.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("QueryOptions")
            .field("operators", &names)
            .field("cached", &self.cached)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

/// A collection of documents and the operators used to query it.
///
/// Documents may be held as any `T: Borrow<Value>`: owned values, boxes,
/// `Rc`/`Arc` handles or plain references.
pub struct QueryEngine<T = Value> {
    collection: Vec<T>,
    registry: OperatorRegistry,
    caches: HashMap<String, Arc<ResultCache>>,
    cache_capacity: usize,
    scope: u64,
}

impl<T: Borrow<Value>> QueryEngine<T> {
    /// Constructs an engine over `collection`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidOperatorName`] if a supplied operator name does
    ///   not start with `$`.
    /// - [`QueryError::UnknownOperator`] if caching was requested for an
    ///   operator that does not exist.
    pub fn create(
        collection: impl IntoIterator<Item = T>,
        options: QueryOptions,
    ) -> Result<Self> {
        let mut registry = OperatorRegistry::new();
        for (name, operator) in options.operators {
            registry.register_operator(name, operator)?;
        }
        Self::with_registry(collection, registry, &options.cached, options.cache_capacity)
    }

    /// Constructs an engine over `collection` using `registry` as is, then
    /// caches the operators named in `cached`.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownOperator`] if a name in `cached` is not
    /// registered.
    pub fn with_registry<S: AsRef<str>>(
        collection: impl IntoIterator<Item = T>,
        registry: OperatorRegistry,
        cached: &[S],
        cache_capacity: usize,
    ) -> Result<Self> {
        let mut engine = Self {
            collection: collection.into_iter().collect(),
            registry,
            caches: HashMap::new(),
            cache_capacity,
            scope: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
        };
        for name in cached {
            engine.cache_operator(name.as_ref())?;
        }
        log::debug!(
            "query engine created over {} documents with {} operators",
            engine.collection.len(),
            engine.registry.len()
        );
        Ok(engine)
    }

    const fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.registry).with_scope(self.scope)
    }

    /// Parse `query` and check its operator names against the registry.
    fn prepare(&self, query: &Value) -> Result<Query> {
        let query = Query::parse(query)?;
        self.evaluator().check_query(&query)?;
        Ok(query)
    }

    /// Run a prepared `query` over the collection, yielding
    /// `(document, matched)`.
    fn scan<'s>(
        &'s self,
        query: &Query,
    ) -> impl Iterator<Item = (&'s T, Result<bool>)> {
        let evaluator = self.evaluator();
        self.collection.iter().map(move |document| {
            (document, evaluator.evaluate_checked(document.borrow(), query))
        })
    }

    /// All documents matching `query`, in collection order.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidQueryShape`] if `query` is not an object.
    /// - Any structural error raised while parsing or matching.
    pub fn find(&self, query: &Value) -> Result<Vec<&T>> {
        let query = self.prepare(query)?;
        log::trace!("scanning {} documents", self.collection.len());
        let mut found = Vec::new();
        for (document, matched) in self.scan(&query) {
            if matched? {
                found.push(document);
            }
        }
        Ok(found)
    }

    /// The first document matching `query`, if any.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::find`].
    pub fn find_one(&self, query: &Value) -> Result<Option<&T>> {
        let query = self.prepare(query)?;
        for (document, matched) in self.scan(&query) {
            if matched? {
                return Ok(Some(document));
            }
        }
        Ok(None)
    }

    /// Whether each document matches `query`, in collection order.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::find`].
    pub fn evaluate(&self, query: &Value) -> Result<Vec<bool>> {
        let query = self.prepare(query)?;
        self.scan(&query).map(|(_, matched)| matched).collect()
    }

    /// Whether any document matches `query`.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::find`].
    pub fn any(&self, query: &Value) -> Result<bool> {
        Ok(self.find_one(query)?.is_some())
    }

    /// Match a single document from outside the collection against `query`.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::find`].
    pub fn evaluate_one(&self, document: &Value, query: &Value) -> Result<bool> {
        // The document is not pinned, so it gets no identity scope.
        Evaluator::new(&self.registry).matches(document, query)
    }

    /// Add or override operator `name`. A cached operator stays cached; its
    /// stale results are dropped.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidOperatorName`] if `name` does not start with `$`.
    pub fn register_operator<F>(&mut self, name: &str, operator: F) -> Result<()>
    where
        F: Fn(Option<&Value>, &Value, &Context<'_>) -> Result<bool>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, operator)?;
        if let Some(cache) = self.caches.get(name) {
            cache.clear();
            self.registry.cache(name, Arc::clone(cache))?;
        }
        Ok(())
    }

    /// Memoize operator `name`, returning its cache. Caching an already
    /// cached operator returns the existing cache.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownOperator`] if `name` is not registered.
    pub fn cache_operator(&mut self, name: &str) -> Result<Arc<ResultCache>> {
        if let Some(cache) = self.caches.get(name) {
            return Ok(Arc::clone(cache));
        }
        let cache = Arc::new(ResultCache::new(self.cache_capacity));
        self.registry.cache(name, Arc::clone(&cache))?;
        self.caches.insert(name.to_string(), Arc::clone(&cache));
        Ok(cache)
    }

    /// The cache of operator `name`, if it is cached.
    #[must_use]
    pub fn cache(&self, name: &str) -> Option<&Arc<ResultCache>> {
        self.caches.get(name)
    }

    /// Cached operator names with their caches.
    pub fn caches(&self) -> impl Iterator<Item = (&str, &Arc<ResultCache>)> {
        self.caches.iter().map(|(name, cache)| (name.as_str(), cache))
    }

    /// Drop every cached result.
    pub fn clear_caches(&self) {
        self.caches.values().for_each(|cache| cache.clear());
    }

    /// The operators this engine evaluates with.
    #[must_use]
    pub const fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Iterate over the documents in collection order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.collection.iter()
    }

    /// The documents in collection order.
    #[must_use]
    pub fn documents(&self) -> &[T] {
        &self.collection
    }
}

impl QueryEngine<Value> {
    /// Constructs an engine from a JSON array of documents.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidCollection`] if `collection` is not an array, or
    /// as [`QueryEngine::create`].
    pub fn from_json(collection: Value, options: QueryOptions) -> Result<Self> {
        match collection {
            Value::Array(documents) => Self::create(documents, options),
            other => Err(QueryError::InvalidCollection(describe(&other))),
        }
    }
}

impl<'a, T: Borrow<Value>> IntoIterator for &'a QueryEngine<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> fmt::Debug for QueryEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("documents", &self.collection.len())
            .field("registry", &self.registry)
            .field("cached", &self.caches.keys().collect::<Vec<_>>())
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    fn create_inventory() -> Value {
        json!([
            {"item": "journal", "qty": 25, "tags": ["blank", "red"]},
            {"item": "notebook", "qty": 50, "tags": ["red", "blank"]},
            {"item": "paper", "qty": 100, "tags": ["red", "blank", "plain"]},
            {"item": "planner", "qty": 75, "tags": ["blank", "red"]},
            {"item": "postcard", "qty": 45, "tags": ["blue"]}
        ])
    }

    fn engine() -> QueryEngine {
        QueryEngine::from_json(create_inventory(), QueryOptions::new()).unwrap()
    }

    #[test]
    fn find_preserves_order() {
        let engine = engine();
        let found = engine.find(&json!({"qty": {"$gte": 50}})).unwrap();
        let items: Vec<&str> = found
            .iter()
            .map(|doc| doc["item"].as_str().unwrap())
            .collect();
        assert_eq!(items, vec!["notebook", "paper", "planner"]);
    }

    #[test]
    fn find_one_and_any() {
        let engine = engine();
        let first = engine.find_one(&json!({"tags": "red"})).unwrap();
        assert_eq!(first.unwrap()["item"], "journal");
        assert!(engine.find_one(&json!({"item": "pen"})).unwrap().is_none());
        assert!(engine.any(&json!({"tags": "blue"})).unwrap());
        assert!(!engine.any(&json!({"tags": "green"})).unwrap());
    }

    #[test]
    fn evaluate_is_per_record() {
        let engine = engine();
        assert_eq!(
            engine.evaluate(&json!({"tags": {"$size": 3}})).unwrap(),
            vec![false, false, true, false, false]
        );
    }

    #[test]
    fn rejects_non_object_queries_before_scanning() {
        let engine = engine();
        for query in [json!(null), json!([]), json!("qty"), json!(1)] {
            assert!(matches!(
                engine.find(&query),
                Err(QueryError::InvalidQueryShape(_))
            ));
            assert!(matches!(
                engine.evaluate(&query),
                Err(QueryError::InvalidQueryShape(_))
            ));
        }
    }

    #[test]
    fn structural_errors_surface_even_on_empty_collections() {
        let engine = QueryEngine::<Value>::create(Vec::new(), QueryOptions::new()).unwrap();
        assert!(matches!(
            engine.find(&json!({"$where": "x"})),
            Err(QueryError::UnsupportedRootOperator(_))
        ));
    }

    #[test]
    fn rejects_non_array_collection() {
        let err = QueryEngine::from_json(json!({"qty": 1}), QueryOptions::new()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidCollection(_)));
    }

    #[test]
    fn validates_option_operator_names() {
        let options = QueryOptions::new()
            .operator("even", |_: Option<&Value>, _: &Value, _: &Context<'_>| Ok(true));
        let err = QueryEngine::from_json(json!([]), options).unwrap_err();
        assert_eq!(err, QueryError::InvalidOperatorName("even".into()));
    }

    #[test]
    fn caching_unknown_operator_fails() {
        let options = QueryOptions::new().cache_operator("$nope");
        let err = QueryEngine::from_json(json!([]), options).unwrap_err();
        assert_eq!(err, QueryError::UnknownOperator("$nope".into()));
    }

    #[test]
    fn evaluate_one_ignores_collection() {
        let engine = engine();
        assert!(engine.evaluate_one(&json!({"qty": 1}), &json!({"qty": {"$lt": 2}})).unwrap());
    }

    #[test]
    fn engines_do_not_share_operators() {
        let mut first = engine();
        let second = engine();
        first
            .register_operator("$always", |_: Option<&Value>, _: &Value, _: &Context<'_>| Ok(true))
            .unwrap();
        assert_eq!(first.find(&json!({"x": {"$always": 1}})).unwrap().len(), 5);
        assert_eq!(
            second.find(&json!({"x": {"$always": 1}})),
            Err(QueryError::UnknownOperator("$always".into()))
        );
    }

    #[test]
    fn cached_operator_survives_override() {
        let mut engine = engine();
        let cache = engine.cache_operator("$gt").unwrap();
        assert!(Arc::ptr_eq(&cache, &engine.cache_operator("$gt").unwrap()));
        assert_eq!(engine.find(&json!({"qty": {"$gt": 60}})).unwrap().len(), 2);
        assert!(!cache.is_empty());

        engine
            .register_operator("$gt", |_: Option<&Value>, _: &Value, _: &Context<'_>| Ok(false))
            .unwrap();
        assert!(cache.is_empty());
        assert!(engine.find(&json!({"qty": {"$gt": 60}})).unwrap().is_empty());
        assert!(!cache.is_empty());
    }

    #[test]
    fn cached_container_values_hit_by_identity() {
        let options = QueryOptions::new().cache_operator("$containsAny");
        let engine = QueryEngine::from_json(create_inventory(), options).unwrap();
        let query = json!({"tags": {"$containsAny": ["plain"]}});
        assert_eq!(engine.find(&query).unwrap().len(), 1);
        assert_eq!(engine.find(&query).unwrap().len(), 1);
        let stats = engine.cache("$containsAny").unwrap().stats();
        assert_eq!((stats.misses, stats.hits), (5, 5));
        engine.clear_caches();
        assert_eq!(engine.cache("$containsAny").unwrap().len(), 0);
    }

    #[test]
    fn holds_shared_documents() {
        let docs: Vec<Rc<Value>> = vec![Rc::new(json!({"a": 1})), Rc::new(json!({"a": 2}))];
        let engine = QueryEngine::create(docs.clone(), QueryOptions::new()).unwrap();
        let found = engine.find(&json!({"a": 2})).unwrap();
        assert!(Rc::ptr_eq(found[0], &docs[1]));

        let borrowed: Vec<&Value> = docs.iter().map(|doc| &**doc).collect();
        let engine = QueryEngine::create(borrowed, QueryOptions::new()).unwrap();
        assert_eq!(engine.len(), 2);
        assert_eq!((&engine).into_iter().count(), 2);
    }
}
