//! Binance 커넥터 HTTP 테스트 (mockito).

use mockito::Matcher;
use rust_decimal_macros::dec;
use signal_core::{Timeframe, TradingPair};
use signal_exchange::{BinanceClient, BinanceConfig, ExchangeClient, ExchangeError};

fn client_for(server: &mockito::ServerGuard) -> BinanceClient {
    BinanceClient::new(BinanceConfig::default().with_base_url(server.url())).unwrap()
}

const KLINES: &str = r#"[
    [1704067200000, "42000.10", "42500.00", "41800.00", "42300.50", "120.5", 1704070799999, "5090000.0", 1500, "60.1", "2540000.0", "0"],
    [1704070800000, "42300.50", "42400.00", "42100.00", "42150.00", "98.25", 1704074399999, "4140000.0", 1200, "40.2", "1700000.0", "0"]
]"#;

#[tokio::test]
async fn test_fetch_candles_parses_klines_and_weight() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "1h".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-mbx-used-weight-1m", "1100")
        .with_body(KLINES)
        .create_async()
        .await;

    let client = client_for(&server);
    let response = client
        .fetch_candles(&TradingPair::new("BTC", "USDT"), Timeframe::H1, 2)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0].open, dec!(42000.10));
    assert_eq!(response.data[1].volume, dec!(98.25));
    assert_eq!(response.data[0].timestamp.timestamp_millis(), 1704067200000);

    let rate_limit = response.rate_limit.unwrap();
    assert_eq!(rate_limit.limit, 1200);
    assert_eq!(rate_limit.remaining, 100);
}

#[tokio::test]
async fn test_http_429_maps_to_rate_limit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v3/ping")
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body("{}")
        .create_async()
        .await;

    let err = client_for(&server).ping().await.unwrap_err();
    assert_eq!(
        err,
        ExchangeError::RateLimit {
            retry_after_ms: 7_000
        }
    );
}

#[tokio::test]
async fn test_error_body_maps_code() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v3/ticker/24hr")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
        .create_async()
        .await;

    let err = client_for(&server)
        .fetch_ticker(&TradingPair::new("NOPE", "USDT"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ExchangeError::ExternalApi {
            code: Some(-1121),
            message: "Invalid symbol.".into()
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_balance_requires_credentials() {
    let server = mockito::Server::new_async().await;
    let err = client_for(&server).fetch_balance("USDT").await.unwrap_err();
    assert!(matches!(err, ExchangeError::Authentication(_)));
}

#[tokio::test]
async fn test_signed_balance_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/account")
        .match_header("X-MBX-APIKEY", "test-key")
        .match_query(Matcher::Regex("signature=[0-9a-f]{64}".into()))
        .with_status(200)
        .with_body(
            r#"{"balances":[{"asset":"USDT","free":"150.5","locked":"10"},{"asset":"BTC","free":"0.1","locked":"0"}]}"#,
        )
        .create_async()
        .await;

    let client = BinanceClient::new(
        BinanceConfig::default()
            .with_base_url(server.url())
            .with_credentials("test-key".into(), "test-secret".into()),
    )
    .unwrap();

    let balance = client.fetch_balance("usdt").await.unwrap().data;
    mock.assert_async().await;
    assert_eq!(balance.free, dec!(150.5));
    assert_eq!(balance.total(), dec!(160.5));
}
