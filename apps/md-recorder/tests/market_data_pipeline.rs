//! Market Data Pipeline Integration Tests
//!
//! Replays raw pushes through the connector and checks what reaches the
//! event bus.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::time::timeout;

use md_recorder::application::ports::{EventEmitter, FeedSession};
use md_recorder::{
    CanonicalTick, EVENT_LOG, EVENT_TICK, EventBus, EventPayload, Exchange, GatewaySettings,
    MarketDataConnector, RecorderWorker, ReplaySession, SubscribeRequest, SymbolExchangeRegistry,
    TickNormalizer, TickPipeline, TopicReceiver,
};

const SETTINGS: &str = r#"{
    "用户名": "000001",
    "密码": "secret",
    "经纪商代码": "9999",
    "交易服务器": "180.168.146.187:{10201,10202}",
    "行情服务器": "180.168.146.187:{10211/10213}"
}"#;

const PUSHES: &[&str] = &[
    r#"{"InstrumentID":"au2504","ExchangeID":"SHFE","UpdateTime":"09:30:01","UpdateMillisec":500,"ActionDay":"20250303","LastPrice":672.5,"Volume":10,"BidPrice1":672.25,"BidVolume1":3,"AskPrice1":672.5,"AskVolume1":4,"OpenPrice":1.7976931348623157e308}"#,
    r#"{"InstrumentID":"au2504","UpdateTime":"","ActionDay":"20250303","LastPrice":673.0}"#,
    "garbage line",
    r#"{"InstrumentID":"rb2505","UpdateTime":"09:30:02","ActionDay":"20250303","LastPrice":3300.0}"#,
    r#"{"InstrumentID":"au2504","UpdateTime":"09:30:02","UpdateMillisec":5,"ActionDay":"20250303","LastPrice":672.75,"BidPrice2":672.0,"BidVolume2":7,"AskPrice2":673.0,"AskVolume2":2}"#,
    r#"{"InstrumentID":"m2505","UpdateTime":"21:05:00","UpdateMillisec":0,"ActionDay":"20250228","TradingDay":"20250303","LastPrice":2850.0}"#,
];

fn write_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

fn local_today() -> NaiveDate {
    Utc::now()
        .with_timezone(&FixedOffset::east_opt(8 * 3600).unwrap())
        .date_naive()
}

async fn next_tick(rx: &mut TopicReceiver) -> (String, CanonicalTick) {
    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for tick")
        .expect("bus closed");
    match event.payload {
        EventPayload::Tick(tick) => (event.topic, *tick),
        EventPayload::Log(_) => panic!("expected a tick on {}", event.topic),
    }
}

struct Harness {
    bus: Arc<EventBus>,
    worker: RecorderWorker,
    session: Arc<ReplaySession>,
}

fn harness(replay: &tempfile::NamedTempFile, symbols: Vec<SubscribeRequest>) -> Harness {
    let bus = Arc::new(EventBus::new(64));
    let registry = Arc::new(SymbolExchangeRegistry::new());
    let pipeline = Arc::new(TickPipeline::new(
        TickNormalizer::new("CTP"),
        Arc::clone(&registry),
        Arc::clone(&bus) as Arc<dyn EventEmitter>,
    ));
    let session = Arc::new(
        ReplaySession::new(replay.path(), pipeline).with_pace(Duration::from_millis(20)),
    );
    let connector = Arc::new(MarketDataConnector::new(
        Arc::clone(&session) as Arc<dyn FeedSession>,
        registry,
    ));
    let worker = RecorderWorker::new(
        connector,
        Arc::clone(&bus) as Arc<dyn EventEmitter>,
        symbols,
        Duration::from_secs(5),
    );
    Harness {
        bus,
        worker,
        session,
    }
}

#[tokio::test]
async fn replayed_pushes_become_canonical_ticks() {
    let replay = write_file(PUSHES);
    let settings_file = write_file(&[SETTINGS]);
    let settings = GatewaySettings::load(settings_file.path()).unwrap();

    let h = harness(
        &replay,
        vec![
            "au2504.SHFE".parse().unwrap(),
            SubscribeRequest::new("m2505", Exchange::Dce),
        ],
    );
    let mut ticks = h.bus.subscribe(EVENT_TICK);
    let mut logs = h.bus.subscribe(EVENT_LOG);

    h.worker.start(&settings.connect_settings()).await.unwrap();

    let (topic, first) = next_tick(&mut ticks).await;
    assert_eq!(topic, "eTick.au2504.SHFE");
    assert_eq!(first.datetime.to_rfc3339(), "2025-03-03T09:30:01.500+08:00");
    assert_eq!(first.last_price, Decimal::from_str("672.5").unwrap());
    assert_eq!(first.open_price, Decimal::ZERO);
    assert_eq!(first.level_1.ask_volume, 4);
    assert!(first.depth.is_none());
    assert_eq!(first.gateway_name, "CTP");

    let (_, second) = next_tick(&mut ticks).await;
    assert_eq!(second.datetime.to_rfc3339(), "2025-03-03T09:30:02.005+08:00");
    let level_2 = second.level(2).unwrap();
    assert_eq!(level_2.bid_volume, 7);
    assert_eq!(level_2.ask_price, Decimal::from_str("673").unwrap());

    let (topic, third) = next_tick(&mut ticks).await;
    assert_eq!(topic, "eTick.m2505.DCE");
    assert_eq!(third.exchange, Exchange::Dce);
    assert_eq!(third.datetime.date_naive(), local_today());

    h.worker.shutdown();
    assert!(ticks.try_recv().is_none());
    assert_eq!(h.session.pushed(), 4);

    let mut messages = Vec::new();
    while let Some(event) = logs.try_recv() {
        if let EventPayload::Log(record) = event.payload {
            messages.push(record.msg);
        }
    }
    assert!(messages.contains(&"Login complete".to_string()));
    assert!(messages.contains(&"Subscribed au2504.SHFE".to_string()));
    assert!(messages.contains(&"Market data gateway closed".to_string()));
}

#[tokio::test]
async fn malformed_front_template_fails_start() {
    let replay = write_file(PUSHES);
    let settings_file = write_file(&[
        r#"{"user_id":"u","password":"p","broker_id":"b",
            "trading_server":"10.0.0.1:41205","market_data_server":"10.0.0.1:{41213/x}"}"#,
    ]);
    let settings = GatewaySettings::load(settings_file.path()).unwrap();

    let h = harness(&replay, vec![SubscribeRequest::new("au2504", Exchange::Shfe)]);
    let err = h.worker.start(&settings.connect_settings()).await.unwrap_err();

    assert!(err.to_string().contains("malformed address template"));
    assert!(!h.session.is_logged_in());
}
