use futures_util::future::BoxFuture;

use crate::events::{Delivery, EventEnvelope, EventSource, LocalDispatcher};
use crate::outbox::{NewOutboxRecord, OutboxError, OutboxStore};

// ============================================================================
// Unit of Work
// ============================================================================
//
// Wraps one business transaction. On commit:
//   1. run the caller's persist step against the open transaction
//   2. collect pending events from every tracked aggregate
//   3. serialize relay-required events into outbox rows in the SAME
//      transaction (the core atomicity guarantee)
//   4. commit
//   5. only then clear pending events and dispatch local events in-process
//
// If anything fails before commit, the transaction is rolled back: no outbox
// rows exist, no local events are dispatched, and the aggregates keep their
// pending events so the caller can retry.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("Business persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] OutboxError),
}

/// Aggregates touched during one business operation. Ephemeral, scoped to a
/// single request.
#[derive(Default)]
pub struct Session<'a> {
    aggregates: Vec<&'a mut dyn EventSource>,
}

impl<'a> Session<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, aggregate: &'a mut dyn EventSource) {
        self.aggregates.push(aggregate);
    }
}

/// What a successful commit produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// Outbox rows written (relay-required events).
    pub relayed: usize,
    /// Local events handed to the in-process dispatcher.
    pub dispatched: usize,
}

pub struct UnitOfWork<'a, S: OutboxStore> {
    store: &'a S,
    dispatcher: Option<&'a LocalDispatcher>,
}

impl<'a, S: OutboxStore> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            dispatcher: None,
        }
    }

    pub fn with_dispatcher(store: &'a S, dispatcher: &'a LocalDispatcher) -> Self {
        Self {
            store,
            dispatcher: Some(dispatcher),
        }
    }

    /// Commit the business operation.
    ///
    /// `persist` receives the open transaction handle and must write every
    /// entity mutation through it; the outbox rows for relay-required events
    /// go into that same transaction before it commits.
    pub async fn commit<F>(
        &self,
        session: &mut Session<'_>,
        persist: F,
    ) -> Result<CommitSummary, CommitError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, anyhow::Result<()>>,
    {
        let mut tx = self.store.begin().await?;

        let staged = match self.stage(&mut tx, session, persist).await {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rb) = self.store.rollback(tx).await {
                    tracing::error!(error = %rb, "Rollback failed after aborted commit");
                }
                return Err(e);
            }
        };

        self.store.commit(tx).await?;

        // The transaction is durable; pending lists are cleared exactly once
        // and local events go out best-effort.
        for aggregate in session.aggregates.iter_mut() {
            aggregate.clear_events();
        }

        let summary = CommitSummary {
            relayed: staged.relayed,
            dispatched: staged.local.len(),
        };

        if let Some(dispatcher) = self.dispatcher {
            for envelope in &staged.local {
                dispatcher.dispatch(envelope);
            }
        } else if !staged.local.is_empty() {
            tracing::debug!(
                count = staged.local.len(),
                "No dispatcher registered; local events dropped"
            );
        }

        tracing::debug!(
            relayed = summary.relayed,
            dispatched = summary.dispatched,
            "Unit of work committed"
        );
        Ok(summary)
    }

    async fn stage<F>(
        &self,
        tx: &mut S::Tx,
        session: &Session<'_>,
        persist: F,
    ) -> Result<Staged, CommitError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, anyhow::Result<()>>,
    {
        persist(tx).await.map_err(CommitError::Persistence)?;

        // Serialize every event before writing any outbox row, so one bad
        // payload aborts the commit with nothing staged (fail-fast).
        let mut relay = Vec::new();
        let mut local = Vec::new();
        for aggregate in &session.aggregates {
            for event in aggregate.pending_events() {
                let envelope = event.to_envelope()?;
                match event.delivery() {
                    Delivery::Relay => relay.push(envelope),
                    Delivery::Local => local.push(envelope),
                }
            }
        }

        let relayed = relay.len();
        for envelope in &relay {
            self.store
                .insert(tx, NewOutboxRecord::from_envelope(envelope))
                .await?;
        }

        Ok(Staged { relayed, local })
    }
}

struct Staged {
    relayed: usize,
    local: Vec<EventEnvelope>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::Category;
    use crate::domain::post::Post;
    use crate::events::{Delivery as Dv, DomainEvent, PendingEvent};
    use crate::outbox::{MemoryOutboxStore, OutboxStatus};
    use serde::ser::Error as _;
    use serde::{Serialize, Serializer};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[tokio::test]
    async fn commit_writes_entity_and_outbox_rows_atomically() {
        let store = MemoryOutboxStore::new();
        let uow = UnitOfWork::new(&store);

        let mut category = Category::create("Docker").unwrap();
        let category_id = category.id();
        let row = serde_json::json!({ "name": category.name(), "slug": category.slug() });

        let mut session = Session::new();
        session.track(&mut category);

        let summary = uow
            .commit(&mut session, move |tx| {
                Box::pin(async move {
                    tx.put_entity("category", category_id, &row)?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert_eq!(summary.relayed, 1);
        assert_eq!(summary.dispatched, 0);
        assert!(category.pending_events().is_empty());

        assert!(store.entity("category", category_id).await.is_some());
        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "CategoryCreated");
        assert_eq!(records[0].aggregate_id, category_id);
        assert_eq!(records[0].status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn failed_persistence_leaves_no_outbox_rows() {
        let store = MemoryOutboxStore::new();
        let uow = UnitOfWork::new(&store);

        let mut category = Category::create("Docker").unwrap();
        let mut session = Session::new();
        session.track(&mut category);

        let result = uow
            .commit(&mut session, |_tx| {
                Box::pin(async { anyhow::bail!("connection reset") })
            })
            .await;

        assert!(matches!(result, Err(CommitError::Persistence(_))));
        assert!(store.records().await.is_empty());
        // Pending events survive so the caller can retry the operation.
        assert_eq!(category.pending_events().len(), 1);
    }

    #[tokio::test]
    async fn failed_store_commit_surfaces_and_keeps_events() {
        let store = MemoryOutboxStore::new();
        store.fail_commits(true).await;
        let uow = UnitOfWork::new(&store);

        let mut category = Category::create("Docker").unwrap();
        let mut session = Session::new();
        session.track(&mut category);

        let result = uow
            .commit(&mut session, |_tx| Box::pin(async { Ok(()) }))
            .await;

        assert!(matches!(result, Err(CommitError::Store(_))));
        assert!(store.records().await.is_empty());
        assert_eq!(category.pending_events().len(), 1);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("payload cannot be serialized"))
        }
    }

    impl DomainEvent for Unserializable {
        fn event_type(&self) -> &'static str {
            "Unserializable"
        }

        fn delivery(&self) -> Dv {
            Dv::Relay
        }
    }

    struct BrokenAggregate {
        pending: Vec<PendingEvent>,
    }

    impl EventSource for BrokenAggregate {
        fn pending_events(&self) -> &[PendingEvent] {
            &self.pending
        }

        fn clear_events(&mut self) {
            self.pending.clear();
        }
    }

    #[tokio::test]
    async fn serialization_failure_aborts_the_whole_commit() {
        let store = MemoryOutboxStore::new();
        let uow = UnitOfWork::new(&store);

        // One good aggregate and one whose event cannot be serialized; the
        // good aggregate's row must not survive either.
        let mut category = Category::create("Docker").unwrap();
        let mut broken = BrokenAggregate {
            pending: vec![PendingEvent::new(Uuid::new_v4(), Unserializable)],
        };

        let mut session = Session::new();
        session.track(&mut category);
        session.track(&mut broken);

        let result = uow
            .commit(&mut session, |_tx| Box::pin(async { Ok(()) }))
            .await;

        assert!(matches!(result, Err(CommitError::Serialization(_))));
        assert!(store.records().await.is_empty());
        assert_eq!(category.pending_events().len(), 1);
    }

    #[tokio::test]
    async fn local_events_dispatch_after_commit_and_skip_the_outbox() {
        let store = MemoryOutboxStore::new();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut dispatcher = LocalDispatcher::new();
        dispatcher.subscribe("PostDrafted", "draft-audit", move |env| {
            seen_clone
                .lock()
                .unwrap()
                .push(env.payload["data"]["title"].to_string());
            Ok(())
        });

        let uow = UnitOfWork::with_dispatcher(&store, &dispatcher);

        let mut post = Post::draft("Zero-copy parsing", "...").unwrap();
        let mut session = Session::new();
        session.track(&mut post);

        let summary = uow
            .commit(&mut session, |_tx| Box::pin(async { Ok(()) }))
            .await
            .unwrap();

        assert_eq!(summary.relayed, 0);
        assert_eq!(summary.dispatched, 1);
        assert!(store.records().await.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn relay_and_local_events_are_partitioned() {
        let store = MemoryOutboxStore::new();
        let dispatcher = LocalDispatcher::new();
        let uow = UnitOfWork::with_dispatcher(&store, &dispatcher);

        let mut post = Post::draft("Zero-copy parsing", "...").unwrap();
        post.publish().unwrap();

        let mut session = Session::new();
        session.track(&mut post);

        let summary = uow
            .commit(&mut session, |_tx| Box::pin(async { Ok(()) }))
            .await
            .unwrap();

        // Drafted stays local, Published goes through the outbox.
        assert_eq!(summary.relayed, 1);
        assert_eq!(summary.dispatched, 1);

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "PostPublished");
    }
}
