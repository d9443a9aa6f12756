//! Live order status notifications over server-sent events.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use event_store::EventStore;
use futures_util::{Stream, StreamExt};
use notifications::StatusNotification;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

/// GET /notifications: registers a live connection for the caller. The
/// connection leaves the registry when the client disconnects.
#[tracing::instrument(skip(state))]
pub async fn subscribe<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let customer_id = identity.customer()?;
    let subscription = state.registry.subscribe(customer_id);
    tracing::info!(
        %customer_id,
        connections = state.registry.connection_count(customer_id),
        "notification stream opened"
    );

    let events = subscription.map(|notification| {
        Event::default()
            .event(StatusNotification::EVENT)
            .json_data(&notification)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
