use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use super::models::{EventKind, Session, UserEvents, UserSessionSummary};
use crate::config::{AnalysisConfig, GapBasis};

/// Caller contract violations. Data noise (dangling stops, duplicate
/// starts) is tolerated by the algorithm and never raises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    #[error("event sequence for user {user_id} is unsorted at index {index}")]
    UnsortedSequence { user_id: String, index: usize },
    #[error("event sequence has an empty user id")]
    EmptyUserId,
}

/// Accumulator for one user's pass. Local to each call, never shared.
#[derive(Debug, Default)]
struct SessionState {
    /// Most recent unmatched start
    last_start: Option<DateTime<Utc>>,
    /// Most recent stop that closed a fragment
    last_stop: Option<DateTime<Utc>>,
    /// Running total for the session currently being built, whole seconds
    accumulated_secs: i64,
    /// A start has been seen without a matching stop
    open: bool,
    /// The gap check passed, so the next completed fragment continues the
    /// session emitted last instead of starting a new one
    merge_next: bool,
}

impl SessionState {
    /// Move the accumulated duration into the session list. A pending merge
    /// folds it into the last emitted session, continuing the same logical
    /// session across the sub-window gap.
    fn emit(&mut self, sessions: &mut Vec<Session>) {
        match sessions.last_mut() {
            Some(last) if self.merge_next => last.duration_secs += self.accumulated_secs,
            _ => sessions.push(Session {
                duration_secs: self.accumulated_secs,
            }),
        }
        self.accumulated_secs = 0;
        self.merge_next = false;
    }
}

/// Reconstruct the ordered session list for one user from their sorted
/// event sequence. Single forward pass, O(n) time, O(1) auxiliary state.
pub fn reconstruct(
    user: &UserEvents,
    config: &AnalysisConfig,
) -> Result<UserSessionSummary, MalformedEvent> {
    if user.user_id.is_empty() {
        return Err(MalformedEvent::EmptyUserId);
    }

    let mut state = SessionState::default();
    let mut sessions: Vec<Session> = Vec::new();
    let mut prev_timestamp: Option<DateTime<Utc>> = None;

    for (index, event) in user.events.iter().enumerate() {
        if prev_timestamp.is_some_and(|prev| event.timestamp < prev) {
            return Err(MalformedEvent::UnsortedSequence {
                user_id: user.user_id.clone(),
                index,
            });
        }
        prev_timestamp = Some(event.timestamp);

        match event.kind {
            EventKind::Start => {
                if index > 1 {
                    if let (Some(stop), Some(start)) = (state.last_stop, state.last_start) {
                        let gap_secs = match config.gap_basis {
                            GapBasis::PreviousFragment => {
                                stop.signed_duration_since(start).num_seconds()
                            }
                            GapBasis::IdleTime => {
                                event.timestamp.signed_duration_since(stop).num_seconds()
                            }
                        };
                        // One-sided: a sub-window gap marks the merge, and
                        // only an emission clears it. Negative gaps never
                        // merge.
                        if (0..config.merge_window_secs).contains(&gap_secs) {
                            state.merge_next = true;
                        }
                    }
                }
                state.last_start = Some(event.timestamp);
                state.open = true;
            }
            EventKind::Stop => {
                // A stop with no open session is out-of-order or duplicate
                // noise and contributes nothing
                if state.open {
                    if let Some(start) = state.last_start {
                        state.last_stop = Some(event.timestamp);
                        state.accumulated_secs += event
                            .timestamp
                            .signed_duration_since(start)
                            .num_seconds()
                            .max(0);
                        state.open = false;
                    }
                }
            }
        }

        if state.accumulated_secs > config.noise_floor_secs && !state.open {
            state.emit(&mut sessions);
        }
    }

    // Whatever is still accumulating when the events run out is dropped
    // unless the flush policy says otherwise. An unmatched trailing start
    // has no measurable time either way.
    if config.flush_trailing && state.accumulated_secs > config.noise_floor_secs {
        state.emit(&mut sessions);
    }

    Ok(UserSessionSummary {
        user_id: user.user_id.clone(),
        sdk_version: user.sdk_version.clone(),
        sessions,
    })
}

/// Reconstruct sessions for every user. Users are independent, so the work
/// fans out across the rayon pool; a user whose sequence violates the input
/// contract is skipped without aborting the rest.
pub fn reconstruct_all(
    users: &BTreeMap<String, UserEvents>,
    config: &AnalysisConfig,
) -> Vec<UserSessionSummary> {
    users
        .par_iter()
        .filter_map(|(user_id, user)| match reconstruct(user, config) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("skipping user {}: {}", user_id, e);
                None
            }
        })
        .collect()
}
