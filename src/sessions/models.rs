use chrono::{DateTime, Utc};

/// Marker kind carried by the `event` column of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Stop,
}

impl EventKind {
    /// Classify a raw event name by its embedded marker
    /// e.g. "ggstart_landscape" -> Start
    pub fn from_event_name(name: &str) -> Option<Self> {
        if name.contains("ggstart") {
            Some(EventKind::Start)
        } else if name.contains("ggstop") {
            Some(EventKind::Stop)
        } else {
            None
        }
    }
}

/// A parsed start/stop marker from the event log
#[derive(Debug, Clone)]
pub struct Event {
    pub user_id: String,
    pub sdk_version: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

/// One user's events, sorted ascending by timestamp.
/// Built once by the loader and only traversed afterwards.
#[derive(Debug, Clone, Default)]
pub struct UserEvents {
    pub user_id: String,
    /// SDK version of the earliest event; a user is assumed to stay on one
    /// version for the observed window.
    pub sdk_version: String,
    pub events: Vec<Event>,
}

impl UserEvents {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A reconstructed play session, whole-second resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub duration_secs: i64,
}

impl Session {
    pub fn is_valid(&self, validity_threshold_secs: i64) -> bool {
        self.duration_secs > validity_threshold_secs
    }
}

/// Reconstruction output for one user
#[derive(Debug, Clone)]
pub struct UserSessionSummary {
    pub user_id: String,
    pub sdk_version: String,
    /// Chronological, matching the order of the underlying events
    pub sessions: Vec<Session>,
}

impl UserSessionSummary {
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn valid_session_count(&self, validity_threshold_secs: i64) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.is_valid(validity_threshold_secs))
            .count()
    }

    /// Mean duration of valid sessions, 0.0 when there are none
    pub fn average_valid_secs(&self, validity_threshold_secs: i64) -> f64 {
        let valid: Vec<i64> = self
            .sessions
            .iter()
            .filter(|s| s.is_valid(validity_threshold_secs))
            .map(|s| s.duration_secs)
            .collect();

        if valid.is_empty() {
            return 0.0;
        }

        valid.iter().sum::<i64>() as f64 / valid.len() as f64
    }
}
