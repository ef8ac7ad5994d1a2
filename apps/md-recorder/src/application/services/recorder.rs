//! Recorder Worker
//!
//! The application run inside the worker process: connect the gateway,
//! wait for login, subscribe the configured instruments, and close the
//! session on shutdown. Lifecycle lines go to both tracing and the event
//! bus (`eLog`).

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::EventEmitter;
use crate::application::services::connector::{
    ConnectSettings, ConnectorError, MarketDataConnector,
};
use crate::domain::event::{EVENT_LOG, EventPayload, LogRecord};
use crate::domain::subscription::SubscribeRequest;

/// How often login status is checked while waiting.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker errors.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The connector rejected an operation.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    /// Login did not complete in time.
    #[error("login did not complete within {0:?}")]
    LoginTimeout(Duration),
}

/// Worker-process application.
pub struct RecorderWorker {
    connector: Arc<MarketDataConnector>,
    emitter: Arc<dyn EventEmitter>,
    symbols: Vec<SubscribeRequest>,
    login_timeout: Duration,
}

impl RecorderWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        connector: Arc<MarketDataConnector>,
        emitter: Arc<dyn EventEmitter>,
        symbols: Vec<SubscribeRequest>,
        login_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            emitter,
            symbols,
            login_timeout,
        }
    }

    /// Connect, wait for login and subscribe every configured symbol.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::LoginTimeout`] if login does not complete,
    /// or the first connector error.
    pub async fn start(&self, settings: &ConnectSettings) -> Result<(), RecorderError> {
        self.write_log("RecorderWorker.start", "Connecting market data gateway");
        self.connector.connect(settings)?;

        self.wait_for_login().await?;
        self.write_log("RecorderWorker.start", "Login complete");

        for request in &self.symbols {
            self.connector.subscribe(request)?;
            self.write_log("RecorderWorker.start", format!("Subscribed {request}"));
        }
        Ok(())
    }

    /// Close the gateway. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.connector.close() {
            self.write_log("RecorderWorker.shutdown", "Market data gateway closed");
        }
    }

    /// Write a lifecycle line to tracing and the event bus.
    pub fn write_log(&self, source: &str, msg: impl Into<String>) {
        let record = LogRecord::new(source, msg);
        tracing::info!(source = %record.source, "{}", record.msg);
        self.emitter.emit(EVENT_LOG, EventPayload::Log(record));
    }

    async fn wait_for_login(&self) -> Result<(), RecorderError> {
        let connector = &self.connector;
        tokio::time::timeout(self.login_timeout, async {
            while !connector.is_logged_in() {
                tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| RecorderError::LoginTimeout(self.login_timeout))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{FeedError, FeedSession, SessionCredentials};
    use crate::domain::address::Endpoint;
    use crate::domain::event::Event;
    use crate::domain::subscription::SymbolExchangeRegistry;
    use crate::domain::tick::Exchange;

    #[derive(Default)]
    struct Session {
        login_on_init: bool,
        logged_in: AtomicBool,
        subscribed: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    impl FeedSession for Session {
        fn register_endpoint(&self, _endpoint: &Endpoint) {}

        fn init(&self, _credentials: &SessionCredentials) -> Result<(), FeedError> {
            self.logged_in.store(self.login_on_init, Ordering::SeqCst);
            Ok(())
        }

        fn is_logged_in(&self) -> bool {
            self.logged_in.load(Ordering::SeqCst)
        }

        fn subscribe_market_data(&self, symbol: &str) -> Result<(), FeedError> {
            self.subscribed.lock().push(symbol.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Emitter(Mutex<Vec<Event>>);

    impl EventEmitter for Emitter {
        fn emit(&self, topic: &str, payload: EventPayload) {
            self.0.lock().push(Event {
                topic: topic.to_string(),
                payload,
            });
        }
    }

    fn settings() -> ConnectSettings {
        ConnectSettings {
            trading_server: "10.0.0.1:41205".to_string(),
            market_data_server: "10.0.0.1:41213".to_string(),
            credentials: SessionCredentials {
                user_id: "u".to_string(),
                password: "p".to_string(),
                broker_id: "b".to_string(),
            },
        }
    }

    fn worker(session: &Arc<Session>, timeout: Duration) -> (Arc<Emitter>, RecorderWorker) {
        let connector = Arc::new(MarketDataConnector::new(
            Arc::clone(session) as Arc<dyn FeedSession>,
            Arc::new(SymbolExchangeRegistry::new()),
        ));
        let emitter = Arc::new(Emitter::default());
        let worker = RecorderWorker::new(
            connector,
            Arc::clone(&emitter) as Arc<dyn EventEmitter>,
            vec![
                SubscribeRequest::new("au2504", Exchange::Shfe),
                SubscribeRequest::new("sc2504", Exchange::Ine),
            ],
            timeout,
        );
        (emitter, worker)
    }

    #[tokio::test]
    async fn start_subscribes_all_symbols() {
        let session = Arc::new(Session {
            login_on_init: true,
            ..Session::default()
        });
        let (emitter, worker) = worker(&session, Duration::from_secs(1));

        worker.start(&settings()).await.unwrap();

        assert_eq!(*session.subscribed.lock(), vec!["au2504", "sc2504"]);
        let events = emitter.0.lock();
        assert!(events.iter().all(|e| e.topic == EVENT_LOG));
        assert!(events.iter().any(|e| matches!(
            &e.payload,
            EventPayload::Log(record) if record.msg == "Subscribed au2504.SHFE"
        )));
    }

    #[tokio::test]
    async fn login_timeout_is_reported() {
        let session = Arc::new(Session::default());
        let (_emitter, worker) = worker(&session, Duration::from_millis(50));

        let err = worker.start(&settings()).await.unwrap_err();
        assert!(matches!(err, RecorderError::LoginTimeout(_)));
        assert!(session.subscribed.lock().is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_once() {
        let session = Arc::new(Session {
            login_on_init: true,
            ..Session::default()
        });
        let (emitter, worker) = worker(&session, Duration::from_secs(1));
        worker.start(&settings()).await.unwrap();
        let before = emitter.0.lock().len();

        worker.shutdown();
        worker.shutdown();

        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.0.lock().len(), before + 1);
    }
}
