// Download progress tracking
//
// Every download gets its own session: the engine task pushes ProgressEvents
// into an mpsc channel, a tracker task folds them into that session's state,
// and pollers read a copy of the state without touching the engine.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use super::models::DownloadResult;

lazy_static::lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap();
    // Emitted by the --progress-template we hand to yt-dlp
    static ref TEMPLATE_RE: Regex = Regex::new(
        r"^\[progress\]([a-z_]+)\|([^|]*)\|([^|]*)\|(.*)$"
    ).unwrap();
}

/// Prefix and fields yt-dlp prints for every progress tick
pub const PROGRESS_TEMPLATE: &str = concat!(
    "download:[progress]%(progress.status)s|%(progress._percent_str)s",
    "|%(progress._speed_str)s|%(progress._eta_str)s"
);

/// Completed or failed sessions kept around for polling
pub const DEFAULT_RETAINED_SESSIONS: usize = 64;

/// Remove terminal colouring sequences from an engine string
pub fn strip_ansi(value: &str) -> String {
    ANSI_RE.replace_all(value, "").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Downloading,
    Finished,
    Other(String),
}

impl From<&str> for EventStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "downloading" => Self::Downloading,
            "finished" => Self::Finished,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One progress callback from the engine, strings exactly as reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: EventStatus,
    pub percent: String,
    pub speed: String,
    pub eta: String,
}

impl ProgressEvent {
    pub fn downloading(percent: &str, speed: &str, eta: &str) -> Self {
        Self {
            status: EventStatus::Downloading,
            percent: percent.to_string(),
            speed: speed.to_string(),
            eta: eta.to_string(),
        }
    }

    pub fn finished() -> Self {
        Self {
            status: EventStatus::Finished,
            percent: String::new(),
            speed: String::new(),
            eta: String::new(),
        }
    }

    /// Parse a line printed through [`PROGRESS_TEMPLATE`]; other output yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = TEMPLATE_RE.captures(line.trim_end())?;
        Some(Self {
            status: EventStatus::from(caps.get(1)?.as_str()),
            percent: caps.get(2)?.as_str().to_string(),
            speed: caps.get(3)?.as_str().to_string(),
            eta: caps.get(4)?.as_str().to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Idle,
    Downloading,
    Finished,
}

/// Snapshot served to pollers as `{progress, speed, eta}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    #[serde(skip)]
    pub phase: ProgressPhase,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::idle()
    }
}

impl ProgressState {
    pub fn idle() -> Self {
        Self {
            progress: 0.0,
            speed: "0B/s".to_string(),
            eta: "N/A".to_string(),
            phase: ProgressPhase::Idle,
        }
    }

    pub fn finished() -> Self {
        Self {
            progress: 100.0,
            speed: "N/A".to_string(),
            eta: "0s".to_string(),
            phase: ProgressPhase::Finished,
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        match &event.status {
            EventStatus::Downloading => {
                let percent = strip_ansi(&event.percent);
                match parse_percent(&percent) {
                    Some(value) => self.progress = value,
                    None => log::debug!("[Progress] Unparsable percent {:?}", percent),
                }
                self.speed = strip_ansi(&event.speed).trim().to_string();
                self.eta = strip_ansi(&event.eta).trim().to_string();
                self.phase = ProgressPhase::Downloading;
            }
            EventStatus::Finished => *self = Self::finished(),
            EventStatus::Other(status) => {
                log::debug!("[Progress] Ignoring engine status {:?}", status)
            }
        }
    }
}

fn parse_percent(value: &str) -> Option<f64> {
    let number: f64 = value.trim().trim_end_matches('%').trim().parse().ok()?;
    if number.is_finite() {
        Some(number.clamp(0.0, 100.0))
    } else {
        None
    }
}

/// Handle returned when a download starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    Running,
    Completed,
    Failed,
}

/// Everything the polling endpoint reports about one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: SessionId,
    pub status: SessionOutcome,
    #[serde(flatten)]
    pub progress: ProgressState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DownloadResult>,
}

struct Session {
    state: ProgressState,
    outcome: SessionOutcome,
    message: String,
    result: Option<DownloadResult>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Session>>,
    // ended sessions, oldest first
    ended: RwLock<VecDeque<SessionId>>,
    latest: RwLock<Option<SessionId>>,
    counter: AtomicUsize,
    retain: usize,
}

/// Per-download progress state, shared between handlers and download tasks
#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_SESSIONS)
    }

    /// Keep at most `retain` ended sessions; running ones are never evicted.
    pub fn with_retention(retain: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                ended: RwLock::new(VecDeque::new()),
                latest: RwLock::new(None),
                counter: AtomicUsize::new(1),
                retain,
            }),
        }
    }

    /// Open a new session in the Idle state.
    pub fn start(&self) -> SessionId {
        let n = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        let id = SessionId(format!("download-{n}"));
        self.inner.sessions.write().insert(
            id.clone(),
            Session {
                state: ProgressState::idle(),
                outcome: SessionOutcome::Running,
                message: "Queued".to_string(),
                result: None,
            },
        );
        *self.inner.latest.write() = Some(id.clone());
        id
    }

    pub fn apply(&self, id: &SessionId, event: &ProgressEvent) {
        if let Some(session) = self.inner.sessions.write().get_mut(id) {
            session.state.apply(event);
            if session.state.phase == ProgressPhase::Downloading {
                session.message = "Downloading".to_string();
            }
        }
    }

    /// Fold every event from `events` into the session until the sender drops.
    pub fn attach(
        &self,
        id: SessionId,
        mut events: UnboundedReceiver<ProgressEvent>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                registry.apply(&id, &event);
            }
        })
    }

    pub fn complete(&self, id: &SessionId, result: DownloadResult) {
        if let Some(session) = self.inner.sessions.write().get_mut(id) {
            session.state = ProgressState::finished();
            session.outcome = SessionOutcome::Completed;
            session.message =
                format!("Video downloaded successfully: {}", result.path.display());
            session.result = Some(result);
        }
        self.retire(id);
    }

    pub fn fail(&self, id: &SessionId, message: impl Into<String>) {
        if let Some(session) = self.inner.sessions.write().get_mut(id) {
            session.outcome = SessionOutcome::Failed;
            session.message = message.into();
        }
        self.retire(id);
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Queue an ended session and evict the oldest ones past the limit.
    // The latest session always stays so /progress keeps reporting it.
    fn retire(&self, id: &SessionId) {
        let latest = self.inner.latest.read().clone();
        let mut ended = self.inner.ended.write();
        if !ended.contains(id) {
            ended.push_back(id.clone());
        }

        let mut kept_latest = None;
        while ended.len() > self.inner.retain {
            let Some(oldest) = ended.pop_front() else {
                break;
            };
            if latest.as_ref() == Some(&oldest) {
                kept_latest = Some(oldest);
                continue;
            }
            self.inner.sessions.write().remove(&oldest);
            log::debug!("[Progress] Evicted {}", oldest);
        }
        if let Some(id) = kept_latest {
            ended.push_front(id);
        }
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<ProgressState> {
        self.inner.sessions.read().get(id).map(|s| s.state.clone())
    }

    /// State of the most recently started session, Idle when there is none.
    pub fn latest_snapshot(&self) -> ProgressState {
        let latest = self.inner.latest.read().clone();
        latest
            .and_then(|id| self.snapshot(&id))
            .unwrap_or_default()
    }

    pub fn status(&self, id: &SessionId) -> Option<SessionStatus> {
        let sessions = self.inner.sessions.read();
        let session = sessions.get(id)?;
        Some(SessionStatus {
            id: id.clone(),
            status: session.outcome,
            progress: session.state.clone(),
            message: session.message.clone(),
            result: session.result.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_downloading_event_strips_control_codes() {
        let mut state = ProgressState::idle();
        state.apply(&ProgressEvent::downloading(
            "\x1b[0;94m 45.0%\x1b[0m",
            "\x1b[0;32m  1.50MiB/s\x1b[0m",
            "\x1b[0;33m00:12\x1b[0m",
        ));

        assert_eq!(state.progress, 45.0);
        assert_eq!(state.speed, "1.50MiB/s");
        assert_eq!(state.eta, "00:12");
        assert_eq!(state.phase, ProgressPhase::Downloading);
    }

    #[test]
    fn test_finished_event_overrides_values() {
        let mut state = ProgressState::idle();
        state.apply(&ProgressEvent::downloading("62.3%", "3.00MiB/s", "00:40"));
        state.apply(&ProgressEvent {
            status: EventStatus::Finished,
            percent: "99.1%".to_string(),
            speed: "4MiB/s".to_string(),
            eta: "00:01".to_string(),
        });

        assert_eq!(state, ProgressState::finished());
        assert_eq!(state.progress, 100.0);
        assert_eq!(state.speed, "N/A");
        assert_eq!(state.eta, "0s");
    }

    #[test]
    fn test_unparsable_percent_keeps_previous_value() {
        let mut state = ProgressState::idle();
        state.apply(&ProgressEvent::downloading("10.0%", "1KiB/s", "01:00"));
        state.apply(&ProgressEvent::downloading("  N/A%", "Unknown B/s", "Unknown"));
        assert_eq!(state.progress, 10.0);
        assert_eq!(state.speed, "Unknown B/s");
    }

    #[test]
    fn test_parse_template_line() {
        let event =
            ProgressEvent::parse_line("[progress]downloading|  12.5%|  2.10MiB/s|00:31").unwrap();
        assert_eq!(event.status, EventStatus::Downloading);
        assert_eq!(event.percent, "  12.5%");
        assert_eq!(event.eta, "00:31");

        let event = ProgressEvent::parse_line("[progress]finished|100.0%|N/A|00:00\n").unwrap();
        assert_eq!(event.status, EventStatus::Finished);

        assert!(ProgressEvent::parse_line("[download] Destination: a.mp4").is_none());
    }

    #[test]
    fn test_new_session_starts_idle_after_previous_finished() {
        let registry = ProgressRegistry::new();
        let first = registry.start();
        registry.apply(&first, &ProgressEvent::downloading("30%", "1MiB/s", "00:10"));
        registry.apply(&first, &ProgressEvent::finished());
        assert_eq!(registry.snapshot(&first), Some(ProgressState::finished()));

        let second = registry.start();
        assert_ne!(first, second);
        assert_eq!(registry.snapshot(&second), Some(ProgressState::idle()));
        assert_eq!(registry.latest_snapshot(), ProgressState::idle());
        assert_eq!(registry.snapshot(&first), Some(ProgressState::finished()));
    }

    #[test]
    fn test_sessions_do_not_interleave() {
        let registry = ProgressRegistry::new();
        let a = registry.start();
        let b = registry.start();
        registry.apply(&a, &ProgressEvent::downloading("80%", "5MiB/s", "00:02"));
        registry.apply(&b, &ProgressEvent::downloading("5%", "100KiB/s", "09:00"));

        assert_eq!(registry.snapshot(&a).unwrap().progress, 80.0);
        assert_eq!(registry.snapshot(&b).unwrap().progress, 5.0);
    }

    #[test]
    fn test_latest_snapshot_without_sessions_is_idle() {
        let registry = ProgressRegistry::new();
        assert_eq!(registry.latest_snapshot(), ProgressState::idle());
        assert!(registry.status(&SessionId::from("download-9".to_string())).is_none());
    }

    #[tokio::test]
    async fn test_attached_tracker_drains_channel() {
        let registry = ProgressRegistry::new();
        let id = registry.start();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = registry.attach(id.clone(), rx);

        tx.send(ProgressEvent::downloading("50.0%", "1MiB/s", "00:05")).unwrap();
        tx.send(ProgressEvent::finished()).unwrap();
        drop(tx);
        handle.await.unwrap();

        let status = registry.status(&id).unwrap();
        assert_eq!(status.progress, ProgressState::finished());
        assert_eq!(status.status, SessionOutcome::Running);
    }

    #[test]
    fn test_ended_sessions_are_evicted_past_retention() {
        let registry = ProgressRegistry::with_retention(3);
        let running = registry.start();

        let mut ended = Vec::new();
        for n in 0..1000 {
            let id = registry.start();
            registry.fail(&id, format!("failure {n}"));
            ended.push(id);
        }

        // three ended sessions plus the one still running
        assert_eq!(registry.len(), 4);
        assert!(registry.status(&running).is_some());
        assert!(registry.status(&ended[0]).is_none());
        assert!(registry.status(&ended[999]).is_some());
        assert_eq!(registry.latest_snapshot(), ProgressState::idle());
    }

    #[test]
    fn test_latest_session_survives_eviction() {
        let registry = ProgressRegistry::with_retention(1);
        let first = registry.start();
        registry.fail(&first, "boom");
        let second = registry.start();
        let newest = registry.start();
        registry.fail(&newest, "boom");
        registry.fail(&second, "boom");

        assert!(registry.status(&newest).is_some());
        assert!(registry.status(&second).is_some());
        assert!(registry.status(&first).is_none());
        assert!(registry.len() <= 2);
    }
}
