//! Integration tests for the chain-monitor's explorer client against a real
//! ledger explorer, plus offline wiremock coverage of the new-joint/stable
//! feed polling shape.

use wallet_coord_chain_monitor::explorer_client::ExplorerClient;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[ignore] // requires a live explorer endpoint
async fn get_balance_against_live_explorer() {
    let url = std::env::var("EXPLORER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let client = ExplorerClient::new(url);
    let addresses = vec!["TESTADDRESS".to_string()];

    use wallet_coord_core::traits::Explorer;
    let balance = client.get_balance(&addresses, None).await;
    assert!(balance.is_ok());
}

#[tokio::test]
async fn poll_new_joints_follows_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/new_joints"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [
                {
                    "unit": "00".repeat(32),
                    "outputs": [{"address": "ADDR1", "amount": 1000}]
                }
            ],
            "next_cursor": "cursor-1"
        })))
        .mount(&mock_server)
        .await;

    let client = ExplorerClient::new(mock_server.uri());
    let page = client.poll_new_joints(None, 50).await.unwrap();

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].outputs[0].address, "ADDR1");
    assert_eq!(page.next_cursor.as_deref(), Some("cursor-1"));
}

#[tokio::test]
async fn poll_stable_units_empty_page_has_no_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/stable_units"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [],
            "next_cursor": null
        })))
        .mount(&mock_server)
        .await;

    let client = ExplorerClient::new(mock_server.uri());
    let page = client.poll_stable_units(None, 200).await.unwrap();

    assert!(page.records.is_empty());
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn explorer_error_status_surfaces_as_node_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/new_joints"))
        .respond_with(ResponseTemplate::new(503).set_body_string("explorer overloaded"))
        .mount(&mock_server)
        .await;

    let client = ExplorerClient::with_retry_config(
        mock_server.uri(),
        wallet_coord_chain_monitor::explorer_client::RetryConfig {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
        },
    );
    let err = client.poll_new_joints(None, 50).await.unwrap_err();
    assert!(matches!(err, wallet_coord_chain_monitor::error::MonitorError::NodeApi { status: 503, .. }));
}
