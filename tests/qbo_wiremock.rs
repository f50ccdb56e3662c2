mod support;

use anyhow::Result;
use qbo_credits::qbo::models::{Account, Payment};
use qbo_credits::qbo::{fetch_all, EntityQuery, QboClient, QboEnvironment, QueryApi, QueryError};
use secrecy::SecretString;
use serde_json::json;
use support::{mount_page, statement, QUERY_PATH, REALM};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> QboClient {
    QboClient::new(
        REALM,
        SecretString::from("test-token".to_string()),
        QboEnvironment::Sandbox,
    )
    .with_base_url(server.uri())
}

#[tokio::test]
async fn query_sends_bearer_token_and_statement() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("query", "SELECT * FROM PaymentMethod"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::envelope(
            "PaymentMethod",
            vec![json!({"Id": "1", "Name": "ACH"})],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server)
        .query("SELECT * FROM PaymentMethod", "PaymentMethod")
        .await?;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["Name"], "ACH");
    Ok(())
}

#[tokio::test]
async fn paginates_until_short_page() -> Result<()> {
    let server = MockServer::start().await;

    let page = |ids: std::ops::RangeInclusive<u32>| {
        ids.map(|n| json!({"Id": n.to_string(), "Name": format!("Account {n}")}))
            .collect::<Vec<_>>()
    };
    mount_page(&server, "Account", 1, 2, page(1..=2)).await;
    mount_page(&server, "Account", 3, 2, page(3..=4)).await;
    mount_page(&server, "Account", 5, 2, page(5..=5)).await;

    let accounts: Vec<Account> =
        fetch_all(&client(&server), &EntityQuery::all("Account"), 2).await?;

    let ids: Vec<&str> = accounts.iter().filter_map(|a| a.id.as_deref()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    Ok(())
}

#[tokio::test]
async fn full_last_page_is_followed_by_empty_page() -> Result<()> {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "Payment",
        1,
        2,
        vec![json!({"Id": "P1"}), json!({"Id": "P2"})],
    )
    .await;

    // No entity key at all on the trailing page.
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("query", statement("Payment", 3, 2).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"QueryResponse": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let payments: Vec<Payment> =
        fetch_all(&client(&server), &EntityQuery::all("Payment"), 2).await?;

    assert_eq!(payments.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unauthorized_status_is_fatal() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("AuthenticationFailed"))
        .mount(&server)
        .await;

    let err = fetch_all::<Account, _>(&client(&server), &EntityQuery::all("Account"), 1000)
        .await
        .unwrap_err();

    match err.downcast_ref::<QueryError>() {
        Some(QueryError::Status { status, body }) => {
            assert_eq!(*status, 401);
            assert_eq!(body, "AuthenticationFailed");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn fault_envelope_is_fatal() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Fault": {
                "Error": [{"Message": "message=ApplicationAuthorizationFailed", "code": "003100"}],
                "type": "SERVICE"
            }
        })))
        .mount(&server)
        .await;

    let err = fetch_all::<Payment, _>(&client(&server), &EntityQuery::all("Payment"), 1000)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<QueryError>(),
        Some(QueryError::Fault { kind, .. }) if kind == "SERVICE"
    ));
    Ok(())
}
