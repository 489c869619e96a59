#![allow(clippy::unwrap_used)]

// Integration tests for `IpLookup` using wiremock.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use racklink_api::{Error, IpLookup};

async fn setup() -> (MockServer, IpLookup) {
    let server = MockServer::start().await;
    let lookup = IpLookup::with_client(reqwest::Client::new(), format!("{}/ip", server.uri()));
    (server, lookup)
}

#[tokio::test]
async fn test_external_ip_from_json() {
    let (server, lookup) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "192.168.10.5"})))
        .mount(&server)
        .await;

    let ip = lookup.external_ipv4(Duration::from_secs(2)).await.unwrap();
    assert_eq!(ip, Ipv4Addr::new(192, 168, 10, 5));
}

#[tokio::test]
async fn test_external_ip_server_error() {
    let (server, lookup) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = lookup.external_ipv4(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_external_ip_times_out() {
    let (server, lookup) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("10.0.0.1")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = lookup
        .external_ipv4(Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 200 }));
}
