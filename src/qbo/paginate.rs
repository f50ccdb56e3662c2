use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::QueryApi;

/// Default page size; the query API caps `MAXRESULTS` at 1000.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Upper bound on pages fetched for a single collection.
pub const MAX_PAGES: usize = 10_000;

/// Which collection to read, with an optional `WHERE` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityQuery<'a> {
    pub entity: &'a str,
    pub predicate: Option<&'a str>,
}

impl<'a> EntityQuery<'a> {
    pub fn all(entity: &'a str) -> Self {
        Self {
            entity,
            predicate: None,
        }
    }

    pub fn filtered(entity: &'a str, predicate: &'a str) -> Self {
        Self {
            entity,
            predicate: Some(predicate).filter(|p| !p.trim().is_empty()),
        }
    }

    /// Render the statement for one page. Positions are 1-based.
    pub fn statement(&self, start_position: usize, max_results: usize) -> String {
        match self.predicate {
            Some(predicate) => format!(
                "SELECT * FROM {} WHERE {} STARTPOSITION {} MAXRESULTS {}",
                self.entity, predicate, start_position, max_results
            ),
            None => format!(
                "SELECT * FROM {} STARTPOSITION {} MAXRESULTS {}",
                self.entity, start_position, max_results
            ),
        }
    }
}

/// Read a whole collection, page by page, in the order the API returns it.
///
/// Stops at the first page shorter than `page_size` (an empty page included).
/// Termination looks at the raw page length; entities that fail to decode as
/// `T` are skipped with a warning.
pub async fn fetch_all<T, A>(api: &A, query: &EntityQuery<'_>, page_size: usize) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    A: QueryApi + ?Sized,
{
    anyhow::ensure!(page_size > 0, "page size must be positive");

    let mut items = Vec::new();
    let mut skipped = 0usize;
    let mut start_position = 1usize;

    for page in 1..=MAX_PAGES {
        let statement = query.statement(start_position, page_size);
        let raw = api
            .query(&statement, query.entity)
            .await
            .with_context(|| format!("Failed to fetch {} page {page}", query.entity))?;
        let page_len = raw.len();

        debug!(
            entity = query.entity,
            start_position,
            count = page_len,
            "Fetched page"
        );

        for value in raw {
            match serde_json::from_value::<T>(value) {
                Ok(item) => items.push(item),
                Err(err) => {
                    skipped += 1;
                    warn!(entity = query.entity, error = %err, "Skipping undecodable entity");
                }
            }
        }

        if page_len < page_size {
            info!(
                entity = query.entity,
                count = items.len(),
                skipped,
                pages = page,
                "Fetched collection"
            );
            return Ok(items);
        }
        start_position += page_size;
    }

    anyhow::bail!(
        "{} query returned too many pages (>{MAX_PAGES}); aborting.",
        query.entity
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::*;
    use crate::qbo::models::Payment;

    /// Serves `total` numbered entities in pages and records each statement.
    struct NumberedApi {
        total: usize,
        statements: Mutex<Vec<String>>,
    }

    impl NumberedApi {
        fn new(total: usize) -> Self {
            Self {
                total,
                statements: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    fn parse_number(statement: &str, keyword: &str) -> usize {
        let mut words = statement.split_whitespace();
        while let Some(word) = words.next() {
            if word == keyword {
                return words.next().unwrap().parse().unwrap();
            }
        }
        panic!("{keyword} missing from {statement}");
    }

    #[async_trait]
    impl QueryApi for NumberedApi {
        async fn query(&self, statement: &str, _entity: &str) -> Result<Vec<Value>> {
            self.statements.lock().unwrap().push(statement.to_string());
            let start = parse_number(statement, "STARTPOSITION");
            let max = parse_number(statement, "MAXRESULTS");
            Ok((start..start + max)
                .take_while(|n| *n <= self.total)
                .map(|n| json!({"Id": n.to_string()}))
                .collect())
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Item {
        id: String,
    }

    async fn ids(total: usize, page_size: usize) -> (Vec<String>, Vec<String>) {
        let api = NumberedApi::new(total);
        let items: Vec<Item> = fetch_all(&api, &EntityQuery::all("Account"), page_size)
            .await
            .unwrap();
        (items.into_iter().map(|i| i.id).collect(), api.statements())
    }

    #[tokio::test]
    async fn test_returns_every_item_in_order() {
        for (total, page_size) in [(0, 3), (1, 3), (3, 3), (7, 3), (9, 3), (10, 1)] {
            let (ids, _) = ids(total, page_size).await;
            let expected: Vec<String> = (1..=total).map(|n| n.to_string()).collect();
            assert_eq!(ids, expected, "total={total} page_size={page_size}");
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_trailing_empty_page() {
        let (_, statements) = ids(6, 3).await;
        assert_eq!(
            statements,
            vec![
                "SELECT * FROM Account STARTPOSITION 1 MAXRESULTS 3",
                "SELECT * FROM Account STARTPOSITION 4 MAXRESULTS 3",
                "SELECT * FROM Account STARTPOSITION 7 MAXRESULTS 3",
            ]
        );
    }

    #[tokio::test]
    async fn test_short_page_stops_immediately() {
        let (_, statements) = ids(2, 1000).await;
        assert_eq!(statements.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_entities_do_not_end_pagination() {
        struct MixedApi;

        #[async_trait]
        impl QueryApi for MixedApi {
            async fn query(&self, statement: &str, _entity: &str) -> Result<Vec<Value>> {
                if parse_number(statement, "STARTPOSITION") == 1 {
                    Ok(vec![json!({"Id": "a"}), json!({"Id": 5})])
                } else {
                    Ok(vec![json!({"Id": "b"})])
                }
            }
        }

        let items: Vec<Item> = fetch_all(&MixedApi, &EntityQuery::all("Payment"), 2)
            .await
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_payments_with_odd_field_types_are_kept() {
        struct PaymentApi;

        #[async_trait]
        impl QueryApi for PaymentApi {
            async fn query(&self, _statement: &str, _entity: &str) -> Result<Vec<Value>> {
                Ok(vec![
                    json!({"Id": "P1", "PaymentRefNum": 5521}),
                    json!({"Id": "P2", "PrivateNote": {"text": "x"}}),
                    json!("not an entity"),
                    json!({"Id": "P3"}),
                ])
            }
        }

        let payments: Vec<Payment> = fetch_all(&PaymentApi, &EntityQuery::all("Payment"), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = payments.iter().map(Payment::id).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
        assert_eq!(payments[0].payment_ref_num.as_deref(), Some("5521"));
        assert!(payments[1].private_note.is_none());
    }

    #[tokio::test]
    async fn test_query_error_propagates() {
        struct FailingApi;

        #[async_trait]
        impl QueryApi for FailingApi {
            async fn query(&self, _statement: &str, _entity: &str) -> Result<Vec<Value>> {
                anyhow::bail!("connection reset")
            }
        }

        let err = fetch_all::<Item, _>(&FailingApi, &EntityQuery::all("Deposit"), 10)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
        assert!(err.to_string().contains("Deposit page 1"));
    }

    #[test]
    fn test_statement_with_predicate() {
        let query = EntityQuery::filtered("Payment", "TxnDate >= '2024-01-01'");
        assert_eq!(
            query.statement(1001, 1000),
            "SELECT * FROM Payment WHERE TxnDate >= '2024-01-01' STARTPOSITION 1001 MAXRESULTS 1000"
        );
        assert_eq!(EntityQuery::filtered("Payment", "  "), EntityQuery::all("Payment"));
    }
}
