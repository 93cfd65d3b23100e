//! Offline coverage of request signing and response parsing, following the
//! same wiremock style used against the chain-monitor's explorer client.

use secp256k1::rand::rngs::OsRng;
use secp256k1::{Secp256k1, SecretKey};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wallet_coord_sdk::types::{CreateWalletRequest, CreateWalletResponse, Network};
use wallet_coord_sdk::Client;

fn random_priv_key() -> SecretKey {
    let secp = Secp256k1::new();
    let (sk, _) = secp.generate_keypair(&mut OsRng);
    sk
}

#[tokio::test]
async fn create_wallet_signs_request_and_parses_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/wallets"))
        .and(header_exists("x-identity"))
        .and(header_exists("x-signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "wallet_id": "4f6c8f0a-9c3e-4b8b-9f3b-4b1b9c3e4b8b"
        })))
        .mount(&server)
        .await;

    let key = random_priv_key();
    let client = Client::new(server.uri()).with_identity("copayer-1", &key.secret_bytes()).unwrap();

    let resp: CreateWalletResponse = client
        .create_wallet(&CreateWalletRequest {
            id: None,
            name: "wallet".to_string(),
            m: 2,
            n: 3,
            coin: "obyte".to_string(),
            network: Network::Main,
            derivation_strategy: None,
            single_address: false,
            creation_pub_key: hex::encode([2u8; 33]),
        })
        .await
        .unwrap();

    assert_eq!(resp.wallet_id.to_string(), "4f6c8f0a-9c3e-4b8b-9f3b-4b1b9c3e4b8b");
}

#[tokio::test]
async fn api_error_body_surfaces_as_client_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wallets"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": "NOT_AUTHORIZED",
            "message": "missing or malformed x-signature header"
        })))
        .mount(&server)
        .await;

    let key = random_priv_key();
    let client = Client::new(server.uri()).with_identity("copayer-1", &key.secret_bytes()).unwrap();

    let err = client.get_own_wallet().await.unwrap_err();
    match err {
        wallet_coord_sdk::ClientError::Api { status, code, .. } => {
            assert_eq!(status, 401);
            assert_eq!(code, "NOT_AUTHORIZED");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
