#![allow(dead_code)]

use std::collections::HashMap;

use qbo_credits::config::Config;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "123";
pub const QUERY_PATH: &str = "/v3/company/123/query";

pub fn config(pairs: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

/// A `QueryResponse` envelope listing `items` under `entity`.
pub fn envelope(entity: &str, items: Vec<Value>) -> Value {
    let mut response = serde_json::Map::new();
    response.insert(entity.to_string(), Value::Array(items));
    response.insert("startPosition".to_string(), json!(1));
    response.insert("maxResults".to_string(), json!(1000));

    json!({
        "QueryResponse": response,
        "time": "2024-06-30T09:00:00.000-07:00"
    })
}

pub fn statement(entity: &str, start: usize, max: usize) -> String {
    format!("SELECT * FROM {entity} STARTPOSITION {start} MAXRESULTS {max}")
}

/// Serve one page of `entity` for the statement starting at `start`.
pub async fn mount_page(
    server: &MockServer,
    entity: &str,
    start: usize,
    max: usize,
    items: Vec<Value>,
) {
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("query", statement(entity, start, max).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(entity, items)))
        .expect(1)
        .mount(server)
        .await;
}
