//! Item processing span helpers.
//!
//! One span per popped item, carrying the worker index and the item value.
//! Transitions of the worker state machine are emitted as events inside it.

use tracing::Span;

use crate::model::Item;

/// Start a span for processing one item.
///
/// The `item.verdict` field is declared empty and filled in once the item
/// has been classified.
pub fn start_item_span(worker: usize, item: &Item) -> Span {
    tracing::info_span!(
        "item.process",
        "worker" = worker,
        "item" = %item,
        "item.verdict" = tracing::field::Empty,
    )
}

/// Record a worker state transition on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
