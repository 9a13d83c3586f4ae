//! Context mode tracking: which documents the server holds, and what that means for answers.
//!
//! The tracker owns a polling task that lists the server's files on a fixed interval
//! and whenever a [`RefreshHandle`] asks for it. Results are published on a `watch`
//! channel so the shell can read the latest snapshot without awaiting.
//!
//! Listing failures are advisory: they are logged and the last known snapshot stays.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ragchat_client::RagClient;
use ragchat_types::{ContextIndicator, ContextMode, FileDescriptor};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default interval between listing polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Longest interval the ticker accepts. Larger intervals are clamped to it.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Latest known listing state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub indicator: ContextIndicator,
    pub files: Vec<FileDescriptor>,
}

/// Asks the polling task for an immediate refresh.
///
/// Requests made while a refresh is already pending collapse into one.
#[derive(Debug, Clone)]
pub struct RefreshHandle(Arc<Notify>);

impl RefreshHandle {
    pub fn request(&self) {
        self.0.notify_one();
    }

    /// A handle not attached to any tracker, plus the `Notify` it signals.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        (Self(Arc::clone(&notify)), notify)
    }
}

pub struct ContextModeTracker {
    client: RagClient,
    interval: Duration,
    state: Arc<watch::Sender<ContextSnapshot>>,
    trigger: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ContextModeTracker {
    #[must_use]
    pub fn new(client: RagClient, interval: Duration) -> Self {
        let (state, _) = watch::channel(ContextSnapshot::default());
        // `tokio::time::interval` panics on a zero period, and resetting it panics
        // when `now + period` overflows.
        let interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval.min(MAX_POLL_INTERVAL)
        };
        Self {
            client,
            interval,
            state: Arc::new(state),
            trigger: Arc::new(Notify::new()),
            in_flight: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    #[must_use]
    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle(Arc::clone(&self.trigger))
    }

    /// Spawn the polling task. Calling it while running does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        tracing::debug!(interval = ?self.interval, "Starting context mode polling");
        self.task = Some(tokio::spawn(poll_loop(
            self.client.clone(),
            self.interval,
            Arc::clone(&self.state),
            Arc::clone(&self.trigger),
            Arc::clone(&self.in_flight),
        )));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Stopping context mode polling");
            task.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// List files now and return the resulting indicator.
    ///
    /// If another refresh is still in flight this returns the current indicator
    /// without issuing a second request.
    pub async fn refresh(&self) -> ContextIndicator {
        refresh_once(&self.client, &self.state, &self.in_flight).await
    }

    #[must_use]
    pub fn indicator(&self) -> ContextIndicator {
        self.state.borrow().indicator
    }

    #[must_use]
    pub fn files(&self) -> Vec<FileDescriptor> {
        self.state.borrow().files.clone()
    }

    /// Receiver notified after every refresh, successful or not.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ContextSnapshot> {
        self.state.subscribe()
    }
}

impl Drop for ContextModeTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ContextModeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextModeTracker")
            .field("interval", &self.interval)
            .field("indicator", &self.indicator())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag even if the refresh future is dropped mid-request.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn refresh_once(
    client: &RagClient,
    state: &watch::Sender<ContextSnapshot>,
    in_flight: &AtomicBool,
) -> ContextIndicator {
    if in_flight.swap(true, Ordering::AcqRel) {
        tracing::debug!("Context refresh already in flight");
        return state.borrow().indicator;
    }
    let result = {
        let _guard = InFlightGuard(in_flight);
        client.list_files().await
    };

    match result {
        Ok(files) => {
            let indicator = ContextIndicator::Known(ContextMode::from_file_count(files.len()));
            tracing::debug!(count = files.len(), "Context mode refreshed");
            state.send_replace(ContextSnapshot { indicator, files });
            indicator
        }
        Err(e) => {
            tracing::warn!(%e, "File listing failed; keeping last known context mode");
            // Wake subscribers so a waiting caller sees the refresh settled.
            state.send_modify(|_| {});
            state.borrow().indicator
        }
    }
}

async fn poll_loop(
    client: RagClient,
    interval: Duration,
    state: Arc<watch::Sender<ContextSnapshot>>,
    trigger: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = trigger.notified() => {
                tracing::debug!("Context refresh requested");
                ticker.reset();
            }
        }
        refresh_once(&client, &state, &in_flight).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ContextModeTracker, ContextSnapshot, MAX_POLL_INTERVAL};
    use ragchat_client::{ClientConfig, RagClient};
    use ragchat_types::{ContextIndicator, ContextMode};
    use tokio::sync::watch;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LONG: Duration = Duration::from_secs(3600);

    fn tracker_for(server: &MockServer, interval: Duration) -> ContextModeTracker {
        let client = RagClient::new(ClientConfig::new(server.uri().parse().unwrap())).unwrap();
        ContextModeTracker::new(client, interval)
    }

    fn listing(names: &[&str]) -> ResponseTemplate {
        let files: Vec<_> = names
            .iter()
            .map(|name| serde_json::json!({ "filename": name }))
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files }))
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    async fn next_change(rx: &mut watch::Receiver<ContextSnapshot>) -> ContextSnapshot {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("refresh within timeout")
            .unwrap();
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn zero_files_is_direct_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&[]))
            .mount(&server)
            .await;

        let tracker = tracker_for(&server, LONG);
        assert_eq!(tracker.indicator(), ContextIndicator::Unknown);
        assert_eq!(
            tracker.refresh().await,
            ContextIndicator::Known(ContextMode::Direct)
        );
        assert!(tracker.files().is_empty());
    }

    #[tokio::test]
    async fn three_files_is_augmented_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&["a.pdf", "b.md", "c.txt"]))
            .mount(&server)
            .await;

        let tracker = tracker_for(&server, LONG);
        let indicator = tracker.refresh().await;
        assert_eq!(
            indicator,
            ContextIndicator::Known(ContextMode::Augmented { count: 3 })
        );
        assert_eq!(indicator.label(), "Document mode: 3 documents");
        let names: Vec<_> = tracker.files().into_iter().map(|f| f.filename).collect();
        assert_eq!(names, vec!["a.pdf", "b.md", "c.txt"]);
    }

    #[tokio::test]
    async fn first_failure_stays_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tracker = tracker_for(&server, LONG);
        assert_eq!(tracker.refresh().await, ContextIndicator::Unknown);
        assert_eq!(tracker.indicator().label(), "Checking documents...");
    }

    #[tokio::test]
    async fn failure_keeps_last_known_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&["notes.md"]))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let tracker = tracker_for(&server, LONG);
        let known = ContextIndicator::Known(ContextMode::Augmented { count: 1 });
        assert_eq!(tracker.refresh().await, known);
        assert_eq!(tracker.refresh().await, known);
        assert_eq!(tracker.files().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_issue_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&["a.pdf"]).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let tracker = tracker_for(&server, LONG);
        let (first, second) = tokio::join!(tracker.refresh(), tracker.refresh());
        assert_eq!(
            first,
            ContextIndicator::Known(ContextMode::Augmented { count: 1 })
        );
        assert_eq!(second, ContextIndicator::Unknown);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn polling_task_refreshes_on_start_and_on_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&[]))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&["a.pdf", "b.pdf"]))
            .mount(&server)
            .await;

        let mut tracker = tracker_for(&server, LONG);
        let mut rx = tracker.subscribe();
        tracker.start();
        assert!(tracker.is_running());

        let first = next_change(&mut rx).await;
        assert_eq!(first.indicator, ContextIndicator::Known(ContextMode::Direct));

        tracker.refresh_handle().request();
        let second = next_change(&mut rx).await;
        assert_eq!(
            second.indicator,
            ContextIndicator::Known(ContextMode::Augmented { count: 2 })
        );

        tracker.stop();
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&[]))
            .mount(&server)
            .await;

        let mut tracker = tracker_for(&server, LONG);
        let mut rx = tracker.subscribe();
        tracker.start();
        tracker.start();
        next_change(&mut rx).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn polls_repeatedly_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&["a.pdf"]))
            .mount(&server)
            .await;

        let mut tracker = tracker_for(&server, Duration::from_millis(50));
        let mut rx = tracker.subscribe();
        tracker.start();
        next_change(&mut rx).await;
        next_change(&mut rx).await;
        next_change(&mut rx).await;
        assert!(request_count(&server).await >= 3);
        assert!(tracker.is_running());
    }

    #[tokio::test]
    async fn stop_ends_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&[]))
            .mount(&server)
            .await;

        let mut tracker = tracker_for(&server, Duration::from_millis(50));
        let mut rx = tracker.subscribe();
        tracker.start();
        next_change(&mut rx).await;
        next_change(&mut rx).await;
        tracker.stop();
        assert!(!tracker.is_running());

        // Let an aborted in-flight request land before counting.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_stop = request_count(&server).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(request_count(&server).await, after_stop);
    }

    #[tokio::test]
    async fn huge_interval_survives_refresh_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(listing(&[]))
            .mount(&server)
            .await;

        let mut tracker = tracker_for(&server, Duration::from_secs(i64::MAX as u64));
        assert_eq!(tracker.interval, MAX_POLL_INTERVAL);
        let mut rx = tracker.subscribe();
        tracker.start();
        next_change(&mut rx).await;

        tracker.refresh_handle().request();
        next_change(&mut rx).await;
        tracker.refresh_handle().request();
        next_change(&mut rx).await;

        assert!(tracker.is_running());
        assert_eq!(request_count(&server).await, 3);
    }
}
