//! Pure derivation of workflow state from an event log.
//!
//! Everything here is a deterministic fold: same events in, same state out,
//! no I/O, no clock reads, no randomness. That determinism is what makes
//! replay and time travel possible elsewhere in the runtime — this crate is
//! the one place it is guaranteed by construction rather than by
//! convention.

pub mod container;

use std::collections::BTreeMap;
use std::sync::Arc;

use chronicle_types::{Event, Handler};

pub use container::{derive_container_state, ContainerDerivation};

/// Fold `events` through `handlers` starting from `initial`, in order.
///
/// Events with no registered handler for their `name` pass through
/// unchanged — a workflow is free to ignore event names it doesn't care
/// about. Events a handler's [`chronicle_types::HandlerOutcome`]
/// additionally wants to emit are discarded: during live execution those
/// were already appended to the log at their own later position, so
/// re-deriving them here would duplicate work the fold must not perform.
#[must_use]
pub fn derive_state<S: Clone>(
    handlers: &BTreeMap<String, Arc<dyn Handler<S>>>,
    initial: S,
    events: &[Event],
) -> S {
    let mut state = initial;
    for event in events {
        if let Some(handler) = handlers.get(&event.name) {
            state = handler.reduce(&state, event).state;
        }
    }
    state
}

/// The slice of `events` a `stateAt(position)` query folds over.
///
/// `position` is the zero-based log position of the event to stop at. This
/// crate treats `position` as **exclusive**: `state_at_slice(events, 0)`
/// returns an empty slice (the state *before* the first event), and
/// `state_at_slice(events, events.len())` returns the full log (the state
/// *after* the last event). This mirrors slicing conventions elsewhere in
/// the workspace (`events[..position]`) and keeps `position` directly
/// usable as a half-open range bound, rather than requiring callers to
/// remember to add or subtract one.
///
/// `position` beyond `events.len()` saturates to the full slice rather than
/// panicking, since a tape or hub caller may pass a position derived from a
/// log that has since grown or shrunk relative to this snapshot.
#[must_use]
pub fn state_at_slice(events: &[Event], position: usize) -> &[Event] {
    let end = position.min(events.len());
    &events[..end]
}

/// Fold only the events up to (exclusive of) `position` — see
/// [`state_at_slice`] for the convention.
#[must_use]
pub fn derive_state_at<S: Clone>(
    handlers: &BTreeMap<String, Arc<dyn Handler<S>>>,
    initial: S,
    events: &[Event],
    position: usize,
) -> S {
    derive_state(handlers, initial, state_at_slice(events, position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{EventDraft, EventId, HandlerOutcome};
    use chrono::Utc;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        n: u32,
    }

    struct Increment;

    impl Handler<Counter> for Increment {
        fn reduce(&self, state: &Counter, _event: &Event) -> HandlerOutcome<Counter> {
            HandlerOutcome::with_events(
                Counter { n: state.n + 1 },
                vec![EventDraft::new("counter:incremented")],
            )
        }
    }

    fn event(name: &str) -> Event {
        Event::new(EventId::new_random(), name, serde_json::json!({}), Utc::now(), None)
    }

    #[test]
    fn unregistered_event_names_leave_state_unchanged() {
        let handlers: BTreeMap<String, Arc<dyn Handler<Counter>>> = BTreeMap::new();
        let state = derive_state(&handlers, Counter::default(), &[event("user:input")]);
        assert_eq!(state, Counter::default());
    }

    #[test]
    fn fold_is_deterministic_and_order_sensitive() {
        let mut handlers: BTreeMap<String, Arc<dyn Handler<Counter>>> = BTreeMap::new();
        handlers.insert("tick".into(), Arc::new(Increment));
        let events: Vec<Event> = (0..5).map(|_| event("tick")).collect();

        let first = derive_state(&handlers, Counter::default(), &events);
        let second = derive_state(&handlers, Counter::default(), &events);
        assert_eq!(first, second);
        assert_eq!(first.n, 5);
    }

    #[test]
    fn emitted_events_from_handler_outcome_are_not_replayed() {
        let mut handlers: BTreeMap<String, Arc<dyn Handler<Counter>>> = BTreeMap::new();
        handlers.insert("tick".into(), Arc::new(Increment));
        // Only the one `tick` event is in the log; the `counter:incremented`
        // each reduce() call would have emitted live was never appended
        // here, so it must not be counted again.
        let state = derive_state(&handlers, Counter::default(), &[event("tick")]);
        assert_eq!(state.n, 1);
    }

    #[test]
    fn state_at_zero_is_the_empty_fold() {
        let mut handlers: BTreeMap<String, Arc<dyn Handler<Counter>>> = BTreeMap::new();
        handlers.insert("tick".into(), Arc::new(Increment));
        let events: Vec<Event> = (0..3).map(|_| event("tick")).collect();

        let at_zero = derive_state_at(&handlers, Counter::default(), &events, 0);
        assert_eq!(at_zero.n, 0);

        let at_two = derive_state_at(&handlers, Counter::default(), &events, 2);
        assert_eq!(at_two.n, 2);

        let at_end = derive_state_at(&handlers, Counter::default(), &events, events.len());
        assert_eq!(at_end.n, 3);
    }

    #[test]
    fn state_at_saturates_past_log_length() {
        let mut handlers: BTreeMap<String, Arc<dyn Handler<Counter>>> = BTreeMap::new();
        handlers.insert("tick".into(), Arc::new(Increment));
        let events: Vec<Event> = (0..2).map(|_| event("tick")).collect();
        let state = derive_state_at(&handlers, Counter::default(), &events, 1000);
        assert_eq!(state.n, 2);
    }
}
