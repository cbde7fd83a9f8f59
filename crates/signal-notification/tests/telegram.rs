//! Telegram 전송기 HTTP 테스트.

use chrono::Utc;
use mockito::Matcher;
use rust_decimal_macros::dec;
use signal_core::{Direction, Signal, Timeframe, TradingPair};
use signal_notification::{NotificationError, NotificationSender, TelegramSender};

fn signal() -> Signal {
    Signal::new(
        TradingPair::new("SOL", "USDT"),
        "binance",
        Direction::Short,
        dec!(150),
        Timeframe::H1,
        Utc::now(),
    )
    .with_stop_loss(dec!(152.25))
    .with_take_profits(vec![dec!(147.75)])
    .with_confidence(7.5)
    .with_strategy("intraday-major")
}

#[tokio::test]
async fn test_signal_posted_as_html() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/botTOKEN/sendMessage")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "chat_id": "42",
            "parse_mode": "HTML",
        })))
        .with_status(200)
        .with_body(r#"{"ok":true,"result":{}}"#)
        .create_async()
        .await;

    let sender = TelegramSender::new("TOKEN", "42").with_api_base(server.url());
    sender.send_signal_notification(&signal()).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_uses_retry_after() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/botTOKEN/sendMessage")
        .with_status(429)
        .with_body(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":12}}"#,
        )
        .create_async()
        .await;

    let sender = TelegramSender::new("TOKEN", "42").with_api_base(server.url());
    let err = sender.send_signal_notification(&signal()).await.unwrap_err();

    assert!(matches!(err, NotificationError::RateLimited(12)));
}

#[tokio::test]
async fn test_api_error_surfaces_description() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/botTOKEN/sendMessage")
        .with_status(400)
        .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
        .create_async()
        .await;

    let sender = TelegramSender::new("TOKEN", "42").with_api_base(server.url());
    let err = sender.send_signal_notification(&signal()).await.unwrap_err();

    match err {
        NotificationError::SendFailed(message) => assert!(message.contains("chat not found")),
        other => panic!("unexpected error: {other}"),
    }
}
