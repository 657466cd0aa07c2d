//! Querying a small inventory with built-in and custom operators, and
//! caching an operator's results.
use docquery::{Context, QueryEngine, QueryOptions};
use serde_json::{Value, json};

fn main() -> Result<(), docquery::QueryError> {
    let inventory = json!([
        {"item": "journal", "qty": 25, "tags": ["blank", "red"], "instock": [{"wh": "A", "qty": 5}, {"wh": "C", "qty": 15}]},
        {"item": "notebook", "qty": 50, "tags": ["red", "blank"], "instock": [{"wh": "C", "qty": 5}]},
        {"item": "paper", "qty": 100, "tags": ["red", "blank", "plain"], "instock": [{"wh": "A", "qty": 60}]},
        {"item": "planner", "qty": 75, "tags": ["blank", "red"], "instock": [{"wh": "A", "qty": 40}]},
        {"item": "postcard", "qty": 45, "tags": ["blue"], "instock": [{"wh": "B", "qty": 15}, {"wh": "C", "qty": 35}]}
    ]);

    let options = QueryOptions::new()
        .operator(
            "$startsWith",
            |value: Option<&Value>, operand: &Value, _: &Context<'_>| {
                Ok(match (value.and_then(Value::as_str), operand.as_str()) {
                    (Some(s), Some(prefix)) => s.starts_with(prefix),
                    _ => false,
                })
            },
        )
        .cache_operator("$startsWith");
    let engine = QueryEngine::from_json(inventory, options)?;

    let queries = [
        json!({"qty": {"$gt": 50}}),
        json!({"instock.qty": 15}),
        json!({"tags": {"$size": 3}}),
        json!({"$or": [{"qty": {"$lt": 30}}, {"tags": "blue"}]}),
        json!({"instock": {"$elemMatch": {"wh": "A", "qty": {"$gte": 40}}}}),
        json!({"item": {"$startsWith": "p"}}),
    ];
    for query in &queries {
        let names: Vec<&str> = engine
            .find(query)?
            .into_iter()
            .filter_map(|doc| doc["item"].as_str())
            .collect();
        println!("{query} -> {names:?}");
    }

    // Second run is answered from the cache.
    engine.find(&json!({"item": {"$startsWith": "p"}}))?;
    if let Some(cache) = engine.cache("$startsWith") {
        println!("$startsWith cache: {:?}", cache.stats());
    }

    match engine.find(&json!({"qty": {"$between": [1, 2]}})) {
        Ok(_) => unreachable!("$between is not registered"),
        Err(err) => println!("error: {err}"),
    }
    Ok(())
}
