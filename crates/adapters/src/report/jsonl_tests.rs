// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rl_core::{Event, EventPayload, TradeSide};
use tempfile::TempDir;

fn trade(account: &str) -> Event {
    Event::new(
        account,
        EventPayload::TradeExecuted {
            account_id: account.to_string(),
            symbol: "EURUSD".to_string(),
            side: TradeSide::Buy,
            quantity: 1.5,
            price: 1.0842,
        },
    )
}

#[tokio::test]
async fn appends_one_line_per_row() {
    let dir = TempDir::new().unwrap();
    let sink = JsonlReportSink::new(dir.path().join("reports/trades.jsonl"));

    let first = vec![ReportRow::from_event(&trade("acct-1")).unwrap()];
    let second = vec![
        ReportRow::from_event(&trade("acct-2")).unwrap(),
        ReportRow::from_event(&trade("acct-3")).unwrap(),
    ];
    sink.write_batch(first).await.unwrap();
    sink.write_batch(second).await.unwrap();

    let contents = std::fs::read_to_string(sink.path()).unwrap();
    let rows: Vec<ReportRow> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].aggregate_id, "acct-1");
    assert_eq!(rows[2].event_type, "Trading.Trade.Executed.v1");
    assert_eq!(rows[1].data["symbol"], "EURUSD");
}

#[tokio::test]
async fn empty_batch_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = JsonlReportSink::new(dir.path().join("trades.jsonl"));

    sink.write_batch(Vec::new()).await.unwrap();

    assert!(!sink.path().exists());
}
