use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An event that does not fit the projected state, such as a status
    /// change for an order that was never placed.
    #[error("Inconsistent stream for {aggregate_id}: {reason}")]
    Inconsistent {
        aggregate_id: common::AggregateId,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
