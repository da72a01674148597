//! Live stream gate.
//!
//! Decides whether a promotional insert plays before the live stream and
//! tracks the insert's skip window. The gate is a synchronous state machine:
//!
//! ```text
//! closed -> awaitingDecision -> insertPlaying -> live
//!                           \________________-> live
//! ```
//!
//! `live` is terminal; a new open cycle requires a reset (the session resets
//! the gate whenever a queue loads or live is requested again). The
//! asynchronous inventory lookup happens in the session so a slow or failing
//! inventory can never wedge the state machine; whatever the lookup yields
//! is reported back through [`LiveGate::resolve_insert`].

use serde::{Deserialize, Serialize};

/// A promotional insert fetched from the inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insert {
    /// Inventory identity.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Audio source URI handed to the media element.
    pub source_url: String,
    /// Known duration in seconds, when the inventory has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Per-insert skip threshold; falls back to the policy default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skippable_after_secs: Option<f64>,
}

/// Gate policy controlling insert behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatePolicy {
    /// Whether inserts are enabled at all. Disabled goes straight to live.
    pub enabled: bool,
    /// Default skip threshold in seconds for inserts without their own.
    pub skippable_after_secs: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            skippable_after_secs: 5.0,
        }
    }
}

/// Gate state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateState {
    /// No live request in flight.
    Closed,
    /// Live requested; insert lookup outstanding.
    AwaitingDecision,
    /// An insert is playing ahead of the live stream.
    InsertPlaying,
    /// The live stream is (or should be) playing. Terminal.
    Live,
}

/// What the gate decided to play.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Play this insert first.
    Insert(Insert),
    /// Go straight to the live stream.
    Live,
}

/// How an insert ended.
///
/// Feeds telemetry and events only; every outcome transitions the gate to
/// live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertOutcome {
    /// Played to its natural end.
    Completed,
    /// Skipped by the user after the threshold.
    Skipped,
    /// The element failed while the insert was playing.
    Failed,
}

impl InsertOutcome {
    /// Returns the outcome as a reason string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// The live stream gate.
#[derive(Debug)]
pub struct LiveGate {
    policy: GatePolicy,
    state: GateState,
    active: Option<Insert>,
}

/// First step of an open cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStep {
    /// Go straight to live (policy disabled).
    GoLive,
    /// Perform the inventory lookup, then call
    /// [`LiveGate::resolve_insert`].
    LookupInsert,
}

impl LiveGate {
    /// Creates a closed gate with the given policy.
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            state: GateState::Closed,
            active: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Returns the insert currently playing, if any.
    #[must_use]
    pub fn active_insert(&self) -> Option<&Insert> {
        self.active.as_ref()
    }

    /// Returns whether an insert is currently playing.
    #[must_use]
    pub fn is_insert_playing(&self) -> bool {
        self.state == GateState::InsertPlaying
    }

    /// Begins an open cycle.
    ///
    /// With inserts disabled the gate moves straight to `Live`; otherwise it
    /// moves to `AwaitingDecision` and the caller performs the lookup.
    pub fn request_open(&mut self) -> OpenStep {
        self.active = None;
        if !self.policy.enabled {
            self.state = GateState::Live;
            return OpenStep::GoLive;
        }
        self.state = GateState::AwaitingDecision;
        OpenStep::LookupInsert
    }

    /// Reports the inventory lookup outcome.
    ///
    /// `None` (nothing available, lookup failed, or stale) degrades to live;
    /// this must never be an error path. Out of `AwaitingDecision` the call
    /// is ignored and live is reported, so a late resolution cannot disturb
    /// a newer cycle.
    pub fn resolve_insert(&mut self, found: Option<Insert>) -> GateDecision {
        if self.state != GateState::AwaitingDecision {
            log::debug!(
                "[Gate] resolve_insert ignored in state {:?}",
                self.state
            );
            return GateDecision::Live;
        }
        match found {
            Some(insert) => {
                self.state = GateState::InsertPlaying;
                self.active = Some(insert.clone());
                GateDecision::Insert(insert)
            }
            None => {
                self.state = GateState::Live;
                GateDecision::Live
            }
        }
    }

    /// Returns whether the active insert may be skipped at `elapsed_secs`.
    ///
    /// True only while an insert is playing and the elapsed time has reached
    /// the effective threshold (the insert's own, else the policy default).
    #[must_use]
    pub fn can_skip(&self, elapsed_secs: f64) -> bool {
        match (&self.state, &self.active) {
            (GateState::InsertPlaying, Some(insert)) => {
                let threshold = insert
                    .skippable_after_secs
                    .unwrap_or(self.policy.skippable_after_secs);
                elapsed_secs >= threshold
            }
            _ => false,
        }
    }

    /// Finishes the active insert and opens the gate to live.
    ///
    /// Every outcome transitions to `Live`; the outcome itself is for
    /// telemetry and events. Outside `InsertPlaying` this is a no-op
    /// returning `None`.
    pub fn finish_insert(&mut self, outcome: InsertOutcome) -> Option<Insert> {
        if self.state != GateState::InsertPlaying {
            return None;
        }
        self.state = GateState::Live;
        let insert = self.active.take();
        log::info!(
            "[Gate] insert {} finished ({}), gate open to live",
            insert.as_ref().map(|i| i.id.as_str()).unwrap_or("?"),
            outcome.as_str()
        );
        insert
    }

    /// Closes the gate for a new cycle.
    pub fn reset(&mut self) {
        self.state = GateState::Closed;
        self.active = None;
    }
}
