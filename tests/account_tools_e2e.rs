mod common;

use common::{alpaca_client, spawn_alpaca};
use stockbot::application::tools::{
    check_connection, close_position, liquidate_position, withdraw, ToolError,
};

#[tokio::test]
async fn test_liquidate_position_against_alpaca() {
    let (url, recorded) = spawn_alpaca().await;
    let client = alpaca_client(&url);

    let order_id = liquidate_position(&client, "USDTUSD", |_| true)
        .await
        .unwrap();
    assert_eq!(order_id, "order-1");

    let orders = recorded.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["symbol"], "USDTUSD");
    assert_eq!(orders[0]["side"], "sell");
    assert_eq!(orders[0]["qty"], "9.7852");
    assert_eq!(orders[0]["time_in_force"], "gtc");

    let missing = liquidate_position(&client, "BCHUSD", |_| true).await;
    assert!(matches!(missing, Err(ToolError::NoPosition(_))));
}

#[tokio::test]
async fn test_close_missing_position_reports_no_position() {
    let (url, _) = spawn_alpaca().await;
    let client = alpaca_client(&url);
    let result = close_position(&client, "USDTUSD", |_| true).await;
    // the stand-in has no DELETE route, which answers 405
    assert!(matches!(result, Err(ToolError::Broker(_))));
}

#[tokio::test]
async fn test_withdraw_posts_string_quantity() {
    let (url, recorded) = spawn_alpaca().await;
    let client = alpaca_client(&url);

    let response = withdraw(&client, "USDT", 9.785282934, "kraken-address", |_| true)
        .await
        .unwrap();
    assert_eq!(response["status"], "PENDING");

    let withdrawals = recorded.withdrawals();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["currency"], "USDT");
    assert_eq!(withdrawals[0]["qty"], "9.785282934");
    assert_eq!(withdrawals[0]["crypto_address"], "kraken-address");

    let aborted = withdraw(&client, "USDT", 1.0, "kraken-address", |_| false).await;
    assert!(matches!(aborted, Err(ToolError::Aborted)));
    assert_eq!(recorded.withdrawals().len(), 1);
}

#[tokio::test]
async fn test_check_connection() {
    let (url, _) = spawn_alpaca().await;
    let summary = check_connection(&alpaca_client(&url)).await.unwrap();
    assert_eq!(summary.account_id, "acc-e2e");
    assert_eq!(summary.cash, 100.0);
}
