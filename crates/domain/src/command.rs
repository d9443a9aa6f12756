//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::Serialize;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Outcome of a successfully executed command.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// State after the new events.
    pub aggregate: A,

    /// Events that were persisted.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// An intention to change one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Loads aggregates, runs commands against them and persists the resulting
/// events with optimistic concurrency.
///
/// Each append expects the version the aggregate was loaded at, so two
/// commands racing on one aggregate cannot both commit.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays an aggregate's stream. A missing stream yields the default state.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Runs `cmd` against the aggregate it targets.
    pub async fn handle<C, F>(&self, cmd: &C, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        C: Command<Aggregate = A>,
        F: FnOnce(&A, &C) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute(cmd.aggregate_id(), |aggregate| command_fn(aggregate, cmd))
            .await
    }

    /// Runs `command_fn` against the current state and appends what it returns.
    ///
    /// Nothing is written if the command fails or returns no events.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;
        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        for event in &events {
            aggregate.apply(event.clone());
        }

        let envelopes =
            Self::build_envelopes(aggregate_id, current_version, &aggregate.tags(), &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::expect_version(current_version))
            .await?;
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        tags: &[(&'static str, String)],
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError>
    where
        A::Event: Serialize,
    {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?;
            for (key, value) in tags {
                builder = builder.tag(*key, value);
            }
            envelopes.push(builder.build()?);
        }

        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::{EventStoreExt, InMemoryEventStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TicketEvent {
        Opened { owner: String },
        Closed,
    }

    impl DomainEvent for TicketEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TicketEvent::Opened { .. } => "TicketOpened",
                TicketEvent::Closed => "TicketClosed",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Ticket {
        id: Option<AggregateId>,
        owner: String,
        closed: bool,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("ticket already closed")]
    struct AlreadyClosed;

    impl From<AlreadyClosed> for DomainError {
        fn from(e: AlreadyClosed) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "Ticket",
                aggregate_id: e.to_string(),
            }
        }
    }

    impl Aggregate for Ticket {
        type Event = TicketEvent;
        type Error = AlreadyClosed;

        fn aggregate_type() -> &'static str {
            "Ticket"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TicketEvent::Opened { owner } => {
                    self.id.get_or_insert_with(AggregateId::new);
                    self.owner = owner;
                }
                TicketEvent::Closed => self.closed = true,
            }
        }

        fn tags(&self) -> Vec<(&'static str, String)> {
            vec![("owner", self.owner.clone())]
        }
    }

    fn close(ticket: &Ticket) -> Result<Vec<TicketEvent>, AlreadyClosed> {
        if ticket.closed {
            return Err(AlreadyClosed);
        }
        Ok(vec![TicketEvent::Closed])
    }

    fn open(owner: &str) -> impl FnOnce(&Ticket) -> Result<Vec<TicketEvent>, AlreadyClosed> {
        let owner = owner.to_string();
        move |_| Ok(vec![TicketEvent::Opened { owner }])
    }

    #[tokio::test]
    async fn execute_persists_and_applies() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(store.clone());
        let id = AggregateId::new();

        handler.execute(id, open("ops")).await.unwrap();
        let result = handler.execute(id, close).await.unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert!(result.aggregate.closed);
        assert_eq!(store.get_events_for_aggregate(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn every_event_carries_aggregate_tags() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(store.clone());
        let id = AggregateId::new();

        handler.execute(id, open("ops")).await.unwrap();
        handler.execute(id, close).await.unwrap();

        assert_eq!(store.aggregates_tagged("owner", "ops").await.unwrap(), vec![id]);
        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert!(events.iter().all(|e| e.tag("owner") == Some("ops")));
    }

    #[tokio::test]
    async fn rejected_command_writes_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(store.clone());
        let id = AggregateId::new();

        handler.execute(id, open("ops")).await.unwrap();
        handler.execute(id, close).await.unwrap();
        assert!(handler.execute(id, close).await.is_err());
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn load_existing_distinguishes_missing_streams() {
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(InMemoryEventStore::new());
        let id = AggregateId::new();

        assert!(handler.load_existing(id).await.unwrap().is_none());
        handler.execute(id, open("ops")).await.unwrap();
        assert_eq!(handler.load_existing(id).await.unwrap().unwrap().owner, "ops");
    }

    struct CloseTicket {
        ticket_id: AggregateId,
    }

    impl Command for CloseTicket {
        type Aggregate = Ticket;

        fn aggregate_id(&self) -> AggregateId {
            self.ticket_id
        }
    }

    #[tokio::test]
    async fn handle_targets_the_command_aggregate() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(store.clone());
        let id = AggregateId::new();
        let other = AggregateId::new();
        handler.execute(id, open("ops")).await.unwrap();
        handler.execute(other, open("ops")).await.unwrap();

        let result = handler
            .handle(&CloseTicket { ticket_id: id }, |ticket, _| close(ticket))
            .await
            .unwrap();

        assert!(result.aggregate.closed);
        assert_eq!(store.get_events_for_aggregate(id).await.unwrap().len(), 2);
        assert_eq!(store.get_events_for_aggregate(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_command_output_is_not_persisted() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Ticket> = CommandHandler::new(store.clone());

        let result = handler
            .execute(AggregateId::new(), |_| Ok(vec![]))
            .await
            .unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }
}
