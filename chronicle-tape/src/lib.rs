//! Read-only time-travel replay over a session's event log.
//!
//! A [`Tape`] is an immutable value carrying a position into an event log;
//! every navigation method (`rewind`/`step`/`step_back`/`step_to`) returns a
//! *new* `Tape` rather than mutating one in place, so a caller can hold
//! several positions over the same log at once. `position` uses the same
//! half-open convention as [`chronicle_deriver::state_at_slice`]:
//! `stateAt(0)` is the state before any event has folded in, and
//! `stateAt(length)` is the state after the full log.
//!
//! `play`/`play_to` are the one place a `Tape` touches the clock — wall-clock
//! gaps between consecutive events, scaled by `replay_speed`, so a UI
//! replaying a session can reproduce its original pacing. [`Tape::pause`]
//! interrupts an in-flight `play` from a cloned handle: every `Tape` derived
//! from the same log shares one playback-status cell (see [`TapeShared`]),
//! so calling `pause()` on a clone the caller kept around stops a `play()`
//! future awaiting on a different clone.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronicle_deriver::derive_state_at;
use chronicle_types::{Event, Handler, SerializedEvent};

mod error;

pub use error::TapeError;

const STATUS_RUNNING: u8 = 0;
const STATUS_PAUSED: u8 = 1;

/// Playback status of a tape's in-flight (or most recent) `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Not currently paused — a `play()` in progress will keep advancing.
    Running,
    /// A `pause()` was requested; `play()` stops at the next step boundary.
    Paused,
}

/// Immutable shared backing for every `Tape` derived from the same log:
/// the handler registry, initial state, the event slice itself, and the
/// one playback-status cell every clone shares (so `pause()` on one handle
/// reaches a `play()` awaiting on another).
struct TapeShared<S> {
    handlers: std::collections::BTreeMap<String, Arc<dyn Handler<S>>>,
    initial_state: S,
    events: Vec<Event>,
    status: AtomicU8,
}

/// A read-only, navigable projection over a session's event log. Construct
/// with [`Tape::new`]; everything else is pure state derivation plus (for
/// `play`) wall-clock pacing.
pub struct Tape<S> {
    shared: Arc<TapeShared<S>>,
    position: usize,
}

impl<S> Clone for Tape<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            position: self.position,
        }
    }
}

impl<S: Clone + Send + Sync + 'static> Tape<S> {
    /// Build a tape over `events`, folding through `handlers` from
    /// `initial_state`, starting rewound to position 0.
    #[must_use]
    pub fn new(
        handlers: std::collections::BTreeMap<String, Arc<dyn Handler<S>>>,
        initial_state: S,
        events: Vec<Event>,
    ) -> Self {
        Self {
            shared: Arc::new(TapeShared {
                handlers,
                initial_state,
                events,
                status: AtomicU8::new(STATUS_RUNNING),
            }),
            position: 0,
        }
    }

    /// Build a tape directly from a store's `get_events` result, decoding
    /// each [`SerializedEvent`] back into a live [`Event`]. Surfaces the
    /// first decode failure rather than skipping malformed rows, matching
    /// the store's own "never silently drop a malformed event" contract.
    pub fn from_serialized(
        handlers: std::collections::BTreeMap<String, Arc<dyn Handler<S>>>,
        initial_state: S,
        serialized: Vec<SerializedEvent>,
    ) -> Result<Self, TapeError> {
        let mut events = Vec::with_capacity(serialized.len());
        for s in serialized {
            let event_id = s.id.clone();
            let event = s
                .into_event()
                .map_err(|source| TapeError::MalformedEvent { event_id, source })?;
            events.push(event);
        }
        Ok(Self::new(handlers, initial_state, events))
    }

    /// Current position, `0..=length`.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total number of events in the log this tape projects.
    #[must_use]
    pub fn length(&self) -> usize {
        self.shared.events.len()
    }

    /// The most recently folded-in event, or `None` at position 0.
    #[must_use]
    pub fn current(&self) -> Option<&Event> {
        self.position.checked_sub(1).and_then(|i| self.shared.events.get(i))
    }

    /// Current playback status.
    #[must_use]
    pub fn status(&self) -> PlaybackStatus {
        match self.shared.status.load(Ordering::SeqCst) {
            STATUS_PAUSED => PlaybackStatus::Paused,
            _ => PlaybackStatus::Running,
        }
    }

    /// State derived at the current position.
    #[must_use]
    pub fn state(&self) -> S {
        self.state_at(self.position)
    }

    /// State derived at `pos`, without changing this tape's position.
    /// `pos` beyond `length()` saturates rather than panicking.
    #[must_use]
    pub fn state_at(&self, pos: usize) -> S {
        derive_state_at(&self.shared.handlers, self.shared.initial_state.clone(), &self.shared.events, pos)
    }

    /// The event at `pos` (`None` for `pos == 0` or `pos >= length()`),
    /// using the same exclusive convention as [`Tape::current`]: the event
    /// that, once folded in, brings the state to `state_at(pos)`.
    #[must_use]
    pub fn event_at(&self, pos: usize) -> Option<&Event> {
        pos.checked_sub(1).and_then(|i| self.shared.events.get(i))
    }

    /// Jump to position 0.
    #[must_use]
    pub fn rewind(&self) -> Self {
        self.step_to(0)
    }

    /// Advance one position, clamped at `length()`.
    #[must_use]
    pub fn step(&self) -> Self {
        self.step_to(self.position + 1)
    }

    /// Retreat one position, clamped at 0.
    #[must_use]
    pub fn step_back(&self) -> Self {
        self.step_to(self.position.saturating_sub(1))
    }

    /// Jump to `pos`, clamped to `[0, length()]`.
    #[must_use]
    pub fn step_to(&self, pos: usize) -> Self {
        Self {
            shared: self.shared.clone(),
            position: pos.min(self.length()),
        }
    }

    /// Mark this tape's shared status as paused, interrupting an in-flight
    /// `play()`/`play_to()` on any clone at its next step boundary.
    /// Returns a tape at the same position with `status() == Paused`.
    #[must_use]
    pub fn pause(&self) -> Self {
        self.shared.status.store(STATUS_PAUSED, Ordering::SeqCst);
        self.clone()
    }

    /// Advance to the end of the log, honoring wall-clock gaps between
    /// consecutive events scaled by `replay_speed` (`1.0` = real time,
    /// `2.0` = twice as fast, `0.0` or less = no delay). Stops early,
    /// returning the tape at whatever position it reached, if `pause()` is
    /// called on a clone before playback finishes.
    pub async fn play(&self, replay_speed: f64) -> Self {
        self.play_to(self.length(), replay_speed).await
    }

    /// Like [`Tape::play`], stopping at `target` instead of the end.
    pub async fn play_to(&self, target: usize, replay_speed: f64) -> Self {
        self.shared.status.store(STATUS_RUNNING, Ordering::SeqCst);
        let target = target.min(self.length());
        let mut current = self.position;

        while current < target {
            if self.shared.status.load(Ordering::SeqCst) == STATUS_PAUSED {
                break;
            }

            if let Some(delay) = gap_before(&self.shared.events, current, replay_speed) {
                tokio::time::sleep(delay).await;
                if self.shared.status.load(Ordering::SeqCst) == STATUS_PAUSED {
                    break;
                }
            }

            current += 1;
        }

        Self {
            shared: self.shared.clone(),
            position: current,
        }
    }

    /// All events in `[from, to)` (exclusive), for tooling built on top of
    /// the core engine (e.g. an HTTP/SSE server re-streaming a recorded
    /// session) — the event log itself is durable, but callers on the read
    /// path should not have to reconstruct exclusivity conventions by hand.
    #[must_use]
    pub fn events_slice(&self, from: usize, to: usize) -> &[Event] {
        let from = from.min(self.length());
        let to = to.min(self.length()).max(from);
        &self.shared.events[from..to]
    }

    /// The full event log as an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Event> {
        self.shared.events.clone()
    }
}

/// Wall-clock gap between the event that just folded at `position` and the
/// next one, scaled by `replay_speed`. `None` when there is no next event
/// or the policy calls for no delay (`replay_speed <= 0.0`).
fn gap_before(events: &[Event], position: usize, replay_speed: f64) -> Option<Duration> {
    if replay_speed <= 0.0 {
        return None;
    }
    let previous = if position == 0 { None } else { events.get(position - 1) };
    let next = events.get(position)?;
    let previous_ts = previous.map(|e| e.timestamp).unwrap_or(next.timestamp);
    let millis = (next.timestamp - previous_ts).num_milliseconds().max(0) as f64 / replay_speed;
    if millis <= 0.0 {
        None
    } else {
        Some(Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{EventDraft, EventId, HandlerOutcome};
    use chrono::{Duration as ChronoDuration, Utc};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Msgs(Vec<String>);

    struct Append;

    impl Handler<Msgs> for Append {
        fn reduce(&self, state: &Msgs, event: &Event) -> HandlerOutcome<Msgs> {
            let mut next = state.0.clone();
            next.push(event.payload["text"].as_str().unwrap_or_default().to_string());
            HandlerOutcome::state_only(Msgs(next))
        }
    }

    fn event_at(name: &str, text: &str, offset_ms: i64) -> Event {
        Event::new(
            EventId::new_random(),
            name,
            serde_json::json!({"text": text}),
            Utc::now() + ChronoDuration::milliseconds(offset_ms),
            None,
        )
    }

    fn tape() -> Tape<Msgs> {
        let mut handlers: std::collections::BTreeMap<String, Arc<dyn Handler<Msgs>>> = std::collections::BTreeMap::new();
        handlers.insert("user:input".into(), Arc::new(Append));
        let events = vec![
            event_at("user:input", "Hi", 0),
            event_at("user:input", "there", 5),
        ];
        Tape::new(handlers, Msgs::default(), events)
    }

    #[test]
    fn rewind_is_the_empty_fold() {
        let t = tape().step_to(2).rewind();
        assert_eq!(t.position(), 0);
        assert_eq!(t.state(), Msgs::default());
        assert!(t.current().is_none());
    }

    #[test]
    fn step_to_one_folds_only_the_first_event() {
        let t = tape().step_to(1);
        assert_eq!(t.state().0, vec!["Hi".to_string()]);
        assert_eq!(t.current().unwrap().payload["text"], "Hi");
    }

    #[test]
    fn step_back_from_end_matches_state_at_length_minus_one() {
        let t = tape().step_to(2).step_back();
        assert_eq!(t.position(), 1);
        assert_eq!(t.state().0, vec!["Hi".to_string()]);
    }

    #[test]
    fn step_to_clamps_to_bounds() {
        assert_eq!(tape().step_to(1000).position(), 2);
        assert_eq!(tape().step_to(0).step_back().position(), 0);
    }

    #[test]
    fn state_at_does_not_move_position() {
        let t = tape();
        assert_eq!(t.state_at(2).0, vec!["Hi".to_string(), "there".to_string()]);
        assert_eq!(t.position(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn play_advances_to_the_end() {
        let t = tape();
        let played = t.play(100.0).await;
        assert_eq!(played.position(), 2);
        assert_eq!(played.state().0, vec!["Hi".to_string(), "there".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn play_to_stops_short_of_the_end() {
        let t = tape();
        let played = t.play_to(1, 100.0).await;
        assert_eq!(played.position(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_on_a_clone_stops_a_concurrent_play() {
        let t = tape().step_to(0);
        let pauser = t.clone();
        pauser.pause();
        let played = t.play(100.0).await;
        // Paused before any stepping happened; position never advanced.
        assert_eq!(played.position(), 0);
        assert_eq!(played.status(), PlaybackStatus::Paused);
    }
}
