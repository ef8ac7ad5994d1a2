//! Replay Feed Session
//!
//! A [`FeedSession`] that replays newline-delimited JSON depth pushes (CTP
//! field names) from a file.
//!
//! # Lifecycle
//!
//! 1. `register_endpoint` collects fronts; the first one is reported as the
//!    connected front.
//! 2. `init` opens the file and starts the push thread, which marks the
//!    session logged in.
//! 3. The push thread waits for the first subscription, then pushes records
//!    for subscribed instruments to the sink, optionally paced.
//! 4. `close` cancels the thread and joins it, so no push is in flight once
//!    it returns.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedError, FeedSession, PushSink, SessionCredentials};
use crate::domain::address::Endpoint;
use crate::domain::tick::RawTick;

/// Poll interval while the push thread waits for the first subscription.
const SUBSCRIPTION_POLL: Duration = Duration::from_millis(10);

/// File-backed market data session.
pub struct ReplaySession {
    path: PathBuf,
    pace: Duration,
    sink: Arc<dyn PushSink>,
    endpoints: Mutex<Vec<Endpoint>>,
    state: Arc<ReplayState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct ReplayState {
    logged_in: AtomicBool,
    subscribed: RwLock<HashSet<String>>,
    pushed: AtomicU64,
    cancel: CancellationToken,
}

impl ReplaySession {
    /// Create a session that replays `path` into `sink`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn PushSink>) -> Self {
        Self {
            path: path.into(),
            pace: Duration::ZERO,
            sink,
            endpoints: Mutex::new(Vec::new()),
            state: Arc::new(ReplayState::default()),
            thread: Mutex::new(None),
        }
    }

    /// Delay between pushes.
    #[must_use]
    pub const fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Number of records delivered to the sink so far.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.state.pushed.load(Ordering::Acquire)
    }

    /// Whether the push thread has run out of records (or was never started).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }
}

impl FeedSession for ReplaySession {
    fn register_endpoint(&self, endpoint: &Endpoint) {
        self.endpoints.lock().push(endpoint.clone());
    }

    fn init(&self, credentials: &SessionCredentials) -> Result<(), FeedError> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            tracing::warn!("Replay session already started");
            return Ok(());
        }

        let front = self
            .endpoints
            .lock()
            .first()
            .cloned()
            .ok_or(FeedError::NoEndpoints)?;

        let file = File::open(&self.path).map_err(|e| {
            FeedError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;

        tracing::info!(
            front = %front,
            user_id = %credentials.user_id,
            broker_id = %credentials.broker_id,
            path = %self.path.display(),
            "Replay front connected"
        );

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let pace = self.pace;
        let handle = thread::Builder::new()
            .name("md-replay".to_string())
            .spawn(move || replay(BufReader::new(file), &state, sink.as_ref(), pace))
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        *thread = Some(handle);
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.state.logged_in.load(Ordering::Acquire)
    }

    fn subscribe_market_data(&self, symbol: &str) -> Result<(), FeedError> {
        if !self.is_logged_in() {
            return Err(FeedError::NotLoggedIn);
        }
        self.state.subscribed.write().insert(symbol.to_string());
        Ok(())
    }

    fn close(&self) {
        self.state.cancel.cancel();
        self.state.logged_in.store(false, Ordering::Release);

        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("Replay thread panicked");
        }
    }
}

impl Drop for ReplaySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn replay(reader: impl BufRead, state: &ReplayState, sink: &dyn PushSink, pace: Duration) {
    state.logged_in.store(true, Ordering::Release);
    tracing::info!("Replay login complete");

    while state.subscribed.read().is_empty() {
        if state.cancel.is_cancelled() {
            return;
        }
        thread::sleep(SUBSCRIPTION_POLL);
    }

    for (index, line) in reader.lines().enumerate() {
        if state.cancel.is_cancelled() {
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Replay read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawTick = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping malformed record");
                continue;
            }
        };

        if !state.subscribed.read().contains(&raw.instrument_id) {
            continue;
        }

        sink.on_push(raw);
        state.pushed.fetch_add(1, Ordering::AcqRel);

        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }

    tracing::info!(pushed = state.pushed.load(Ordering::Acquire), "Replay finished");
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[derive(Default)]
    struct Sink(Mutex<Vec<RawTick>>);

    impl PushSink for Sink {
        fn on_push(&self, raw: RawTick) {
            self.0.lock().push(raw);
        }
    }

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            user_id: "000001".to_string(),
            password: "p".to_string(),
            broker_id: "9999".to_string(),
        }
    }

    fn replay_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not met in time");
    }

    fn session(file: &tempfile::NamedTempFile) -> (Arc<Sink>, ReplaySession) {
        let sink = Arc::new(Sink::default());
        let session = ReplaySession::new(file.path(), Arc::clone(&sink) as Arc<dyn PushSink>);
        (sink, session)
    }

    #[test]
    fn init_requires_an_endpoint() {
        let file = replay_file(&[]);
        let (_sink, session) = session(&file);
        assert!(matches!(
            session.init(&credentials()),
            Err(FeedError::NoEndpoints)
        ));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let sink = Arc::new(Sink::default());
        let session = ReplaySession::new("/nonexistent/ticks.jsonl", sink);
        session.register_endpoint(&Endpoint::new("10.0.0.1:41213"));
        assert!(matches!(
            session.init(&credentials()),
            Err(FeedError::Unavailable(_))
        ));
        assert!(!session.is_logged_in());
    }

    #[test]
    fn subscribe_before_login_is_rejected() {
        let file = replay_file(&[]);
        let (_sink, session) = session(&file);
        assert!(matches!(
            session.subscribe_market_data("au2504"),
            Err(FeedError::NotLoggedIn)
        ));
    }

    #[test]
    fn pushes_only_subscribed_instruments() {
        let file = replay_file(&[
            r#"{"InstrumentID":"au2504","UpdateTime":"09:00:00","LastPrice":672.5}"#,
            "not json",
            "",
            r#"{"InstrumentID":"rb2505","UpdateTime":"09:00:00","LastPrice":3300.0}"#,
            r#"{"InstrumentID":"au2504","UpdateTime":"09:00:01","LastPrice":672.75}"#,
        ]);
        let (sink, session) = session(&file);
        session.register_endpoint(&Endpoint::new("10.0.0.1:41213"));
        session.init(&credentials()).unwrap();

        wait_until(|| session.is_logged_in());
        session.subscribe_market_data("au2504").unwrap();
        wait_until(|| session.is_finished());

        let pushes = sink.0.lock();
        assert_eq!(pushes.len(), 2);
        assert!(pushes.iter().all(|raw| raw.instrument_id == "au2504"));
        assert_eq!(pushes[1].update_time, "09:00:01");
        assert_eq!(session.pushed(), 2);
    }

    #[test]
    fn close_is_idempotent_and_stops_pushes() {
        let file = replay_file(&[
            r#"{"InstrumentID":"au2504","UpdateTime":"09:00:00"}"#,
            r#"{"InstrumentID":"au2504","UpdateTime":"09:00:01"}"#,
            r#"{"InstrumentID":"au2504","UpdateTime":"09:00:02"}"#,
        ]);
        let sink = Arc::new(Sink::default());
        let session = ReplaySession::new(file.path(), Arc::clone(&sink) as Arc<dyn PushSink>)
            .with_pace(Duration::from_millis(200));
        session.register_endpoint(&Endpoint::new("10.0.0.1:41213"));
        session.init(&credentials()).unwrap();
        wait_until(|| session.is_logged_in());
        session.subscribe_market_data("au2504").unwrap();
        wait_until(|| session.pushed() >= 1);

        session.close();
        let pushed = sink.0.lock().len();
        session.close();

        assert!(!session.is_logged_in());
        assert!(session.is_finished());
        assert!(pushed < 3);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(sink.0.lock().len(), pushed);
    }
}
