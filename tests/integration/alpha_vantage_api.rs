//! Alpha Vantage client against a mock server

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use test_log::test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stock_news_ingest::api::{AlphaVantageClient, ApiRateLimiter, FetchRequest, RecordSource};
use stock_news_ingest::error::IngestError;
use stock_news_ingest::models::Record;

use crate::common::test_data::period;

fn bar(close: &str) -> Value {
    json!({
        "1. open": "370.00",
        "2. high": "380.25",
        "3. low": "365.10",
        "4. close": close,
        "5. adjusted close": close,
        "6. volume": "250000000",
        "7. dividend amount": "0.0000"
    })
}

fn series_body() -> Value {
    json!({
        "Meta Data": { "2. Symbol": "SPY" },
        "Weekly Adjusted Time Series": {
            "2021-02-05": bar("387.71"),
            "2021-01-29": bar("370.07"),
            "2021-01-22": bar("382.88"),
            "2021-01-15": bar("375.70"),
            "2021-01-08": bar("381.26")
        }
    })
}

fn client(server: &MockServer) -> AlphaVantageClient {
    AlphaVantageClient::new("test-key".to_string(), "spy", &server.uri(), Arc::new(ApiRateLimiter::new(600))).unwrap()
}

#[test(tokio::test)]
async fn test_series_is_downloaded_once_and_windowed_by_month() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "TIME_SERIES_WEEKLY_ADJUSTED"))
        .and(query_param("symbol", "SPY"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.source_id(), "stock:SPY");

    let january = client
        .fetch_page(&FetchRequest { period: period(2021, 1), offset: 0, limit: 25 })
        .await
        .unwrap();
    let keys: Vec<String> = january.records.iter().map(Record::natural_key).collect();
    assert_eq!(keys, vec!["SPY:2021-01-08", "SPY:2021-01-15", "SPY:2021-01-22", "SPY:2021-01-29"]);
    assert_eq!(january.upstream_len, 4);

    let paged = client
        .fetch_page(&FetchRequest { period: period(2021, 1), offset: 2, limit: 1 })
        .await
        .unwrap();
    assert_eq!(paged.records[0].natural_key(), "SPY:2021-01-22");

    let march = client
        .fetch_page(&FetchRequest { period: period(2021, 3), offset: 0, limit: 25 })
        .await
        .unwrap();
    assert!(march.records.is_empty());
    assert!(march.is_exhausted(25));
}

#[test(tokio::test)]
async fn test_rejected_key_maps_to_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server)
        .fetch_page(&FetchRequest { period: period(2021, 1), offset: 0, limit: 25 })
        .await;
    assert_matches!(result, Err(IngestError::Auth(_)));
}

#[test(tokio::test)]
async fn test_rate_limit_note_maps_to_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Note": "Our standard API call frequency is 5 calls per minute and 500 calls per day."
        })))
        .mount(&server)
        .await;

    let result = client(&server)
        .fetch_page(&FetchRequest { period: period(2021, 1), offset: 0, limit: 25 })
        .await;
    assert_matches!(result, Err(IngestError::UpstreamUnavailable(_)));
}
