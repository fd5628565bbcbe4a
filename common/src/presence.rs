use std::time::{Duration, Instant};

use crate::types::PresenceStatus;

/// Status change reported by [`PresenceTracker::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    /// Home -> Away.
    Left,
    /// Away -> Home.
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub status: PresenceStatus,
    pub edge: Option<PresenceEdge>,
    /// Time since the last detected motion.
    pub idle: Duration,
}

/// Occupancy state driven by motion samples and a no-motion timeout.
///
/// Starts `Home` with the last motion set to the construction instant, so a
/// fresh process always assumes someone is in.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    last_motion_at: Instant,
    status: PresenceStatus,
    timeout: Duration,
}

impl PresenceTracker {
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self {
            last_motion_at: now,
            status: PresenceStatus::Home,
            timeout,
        }
    }

    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    pub fn last_motion_at(&self) -> Instant {
        self.last_motion_at
    }

    /// `detected` is the OR over every motion sensor for one sample.
    pub fn observe_motion(&mut self, detected: bool, now: Instant) {
        if detected {
            self.last_motion_at = now;
        }
    }

    pub fn evaluate(&mut self, now: Instant) -> PresenceUpdate {
        let idle = now.saturating_duration_since(self.last_motion_at);
        let previous = self.status;

        self.status = if idle >= self.timeout {
            PresenceStatus::Away
        } else {
            PresenceStatus::Home
        };

        let edge = match (previous, self.status) {
            (PresenceStatus::Home, PresenceStatus::Away) => Some(PresenceEdge::Left),
            (PresenceStatus::Away, PresenceStatus::Home) => Some(PresenceEdge::Returned),
            _ => None,
        };

        PresenceUpdate {
            status: self.status,
            edge,
            idle,
        }
    }
}
