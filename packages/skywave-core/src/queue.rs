//! Track queue controller.
//!
//! Owns the ordered track list, the current position, the shuffle and
//! repeat-one flags, and the play-history used to avoid shuffle repeats
//! within a cycle. The controller is purely synchronous; the playback
//! session drives it and owns all element side effects.
//!
//! The play-history is only ever written through [`TrackQueue::mark_played`]
//! (called on track completion) and cleared either by a reload or by shuffle
//! selection detecting an exhausted cycle. `advance` itself never records
//! history.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// A playable track as delivered by the station CMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable identity within the CMS.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Artist display name.
    pub artist: String,
    /// Optional artwork reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    /// Audio source URI handed to the media element.
    pub source_url: String,
    /// Known duration in seconds, when the CMS has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Navigation direction for [`TrackQueue::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Move forward through the queue.
    Next,
    /// Move backward, or restart the current track past the threshold.
    Previous,
}

/// Outcome of a queue advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The queue moved to a different position; load this track.
    Switched(Track),
    /// Keep the current track and restart it from position zero.
    RestartCurrent,
    /// Nothing to play (the queue is empty).
    Empty,
}

/// Tunable queue behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePolicy {
    /// `previous` restarts the current track at or beyond this many elapsed
    /// seconds instead of stepping back.
    pub previous_restart_threshold_secs: f64,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            previous_restart_threshold_secs: 3.0,
        }
    }
}

/// Ordered/shuffled track sequence with play-history.
#[derive(Debug)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
    shuffle: bool,
    repeat_one: bool,
    /// Identities completed this shuffle cycle. Always a subset of the
    /// identities in `tracks`.
    played: HashSet<String>,
    policy: QueuePolicy,
}

impl TrackQueue {
    /// Creates an empty queue with the given policy.
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            shuffle: false,
            repeat_one: false,
            played: HashSet::new(),
            policy,
        }
    }

    /// Replaces the queue contents.
    ///
    /// Clears the play-history and selects the starting track by identity
    /// (first track when `start_at` is absent or unknown). Does not touch
    /// the shuffle/repeat flags and does not initiate playback.
    pub fn load(&mut self, tracks: Vec<Track>, start_at: Option<&str>) {
        self.tracks = tracks;
        self.played.clear();
        self.current = if self.tracks.is_empty() {
            None
        } else {
            let index = start_at
                .and_then(|id| self.tracks.iter().position(|t| t.id == id))
                .unwrap_or(0);
            Some(index)
        };
        tracing::debug!(
            count = self.tracks.len(),
            start = ?self.current,
            "queue loaded"
        );
    }

    /// Returns the currently selected track, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Returns the index of the currently selected track, if any.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Moves through the queue.
    ///
    /// `elapsed_secs` is the playback position of the current track and only
    /// matters for `previous`: below the policy threshold it steps back
    /// (wrapping 0 to the last index, in shuffle mode too); at or beyond it
    /// the caller should restart the current track instead. `next` always
    /// wraps past the end in ordered mode; in shuffle mode it picks uniformly
    /// among tracks outside the play-history, clearing the history first when
    /// the cycle is exhausted.
    pub fn advance(&mut self, direction: Direction, elapsed_secs: f64) -> Advance {
        if self.tracks.is_empty() {
            return Advance::Empty;
        }

        let index = match direction {
            Direction::Previous => {
                if self.current.is_some()
                    && elapsed_secs >= self.policy.previous_restart_threshold_secs
                {
                    return Advance::RestartCurrent;
                }
                match self.current {
                    Some(0) | None => self.tracks.len() - 1,
                    Some(i) => i - 1,
                }
            }
            Direction::Next if self.shuffle => self.pick_shuffled(),
            Direction::Next => match self.current {
                Some(i) => (i + 1) % self.tracks.len(),
                None => 0,
            },
        };

        self.current = Some(index);
        Advance::Switched(self.tracks[index].clone())
    }

    /// Records a completed track in the play-history.
    ///
    /// Idempotent; identities not present in the queue are ignored so the
    /// history stays a subset of queue identities. Returns `true` when the
    /// identity was newly recorded.
    pub fn mark_played(&mut self, track_id: &str) -> bool {
        if !self.tracks.iter().any(|t| t.id == track_id) {
            return false;
        }
        self.played.insert(track_id.to_string())
    }

    /// Sets the shuffle flag. Never resets history or position.
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    /// Sets the repeat-one flag. Never resets history or position.
    ///
    /// Repeat-one is honored by the caller: it restarts the current track
    /// instead of calling [`advance`](Self::advance) on completion.
    pub fn set_repeat_one(&mut self, repeat_one: bool) {
        self.repeat_one = repeat_one;
    }

    /// Returns whether shuffle is enabled.
    #[must_use]
    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    /// Returns whether repeat-one is enabled.
    #[must_use]
    pub fn is_repeat_one(&self) -> bool {
        self.repeat_one
    }

    /// Returns the number of tracks in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns whether the queue holds no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Returns the queued tracks in order.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Returns the number of identities currently in the play-history.
    #[must_use]
    pub fn played_count(&self) -> usize {
        self.played.len()
    }

    /// Picks the next shuffle index.
    ///
    /// Candidates exclude the current track and everything in the
    /// play-history. An empty candidate set means the cycle is exhausted:
    /// the history is cleared and the pick retried against the full queue
    /// (still excluding the current track when more than one track exists).
    fn pick_shuffled(&mut self) -> usize {
        let current_id = self.current.and_then(|i| self.tracks.get(i)).map(|t| t.id.as_str());

        let candidates: Vec<usize> = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| Some(t.id.as_str()) != current_id && !self.played.contains(&t.id))
            .map(|(i, _)| i)
            .collect();

        if let Some(&index) = candidates.choose(&mut rand::rng()) {
            return index;
        }

        tracing::debug!("shuffle cycle exhausted, clearing play-history");
        self.played.clear();

        let fallback: Vec<usize> = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| Some(t.id.as_str()) != current_id)
            .map(|(i, _)| i)
            .collect();

        match fallback.choose(&mut rand::rng()) {
            Some(&index) => index,
            // Single-track queue: the only choice is the current track again.
            None => self.current.unwrap_or(0),
        }
    }
}
