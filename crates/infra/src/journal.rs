//! In-process append-only event journal.
//!
//! Every committed aggregate event is wrapped in an [`EventEnvelope`] and kept
//! per aggregate stream with a 1-based, gap-free sequence number. Events are
//! staged inside a database transaction and only become visible when that
//! transaction commits.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use fleetstock_core::{DomainError, ExpectedVersion};
use fleetstock_events::{Event, EventEnvelope};

use crate::error::EngineResult;

/// Committed journal entries.
#[derive(Debug, Default)]
pub struct EventJournal {
    entries: Vec<EventEnvelope<JsonValue>>,
    streams: HashMap<Uuid, Vec<usize>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in commit order.
    pub fn entries(&self) -> &[EventEnvelope<JsonValue>] {
        &self.entries
    }

    /// Last sequence number of a stream (0 for an unknown stream).
    pub fn current_version(&self, aggregate_id: Uuid) -> u64 {
        self.streams
            .get(&aggregate_id)
            .and_then(|idx| idx.last())
            .map(|i| self.entries[*i].sequence_number())
            .unwrap_or(0)
    }

    fn aggregate_type(&self, aggregate_id: Uuid) -> Option<&str> {
        self.streams
            .get(&aggregate_id)
            .and_then(|idx| idx.first())
            .map(|i| self.entries[*i].aggregate_type())
    }

    /// Events of one aggregate stream, ascending by sequence number.
    pub fn stream(&self, aggregate_id: Uuid) -> Vec<EventEnvelope<JsonValue>> {
        self.streams
            .get(&aggregate_id)
            .map(|idx| idx.iter().map(|i| self.entries[*i].clone()).collect())
            .unwrap_or_default()
    }

    fn push(&mut self, envelope: EventEnvelope<JsonValue>) {
        let index = self.entries.len();
        self.streams
            .entry(envelope.aggregate_id())
            .or_default()
            .push(index);
        self.entries.push(envelope);
    }

    pub(crate) fn commit(&mut self, staged: StagedEvents) {
        for envelope in staged.envelopes {
            self.push(envelope);
        }
    }
}

/// Events staged by one open transaction.
#[derive(Debug, Default)]
pub struct StagedEvents {
    heads: HashMap<Uuid, u64>,
    envelopes: Vec<EventEnvelope<JsonValue>>,
}

impl StagedEvents {
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Stage `events` for `aggregate_id`, checking the stream head against
    /// `expected` (committed head plus anything already staged).
    pub fn stage<E>(
        &mut self,
        journal: &EventJournal,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected: ExpectedVersion,
        events: &[E],
    ) -> EngineResult<()>
    where
        E: Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }

        if let Some(existing) = journal.aggregate_type(aggregate_id) {
            if existing != aggregate_type {
                return Err(DomainError::invariant(format!(
                    "stream {aggregate_id} belongs to '{existing}', attempted append with '{aggregate_type}'"
                ))
                .into());
            }
        }

        let head = self
            .heads
            .get(&aggregate_id)
            .copied()
            .unwrap_or_else(|| journal.current_version(aggregate_id));
        expected.check(head)?;

        let mut next = head;
        for event in events {
            next += 1;
            self.envelopes.push(EventEnvelope::from_typed(
                aggregate_id,
                aggregate_type,
                next,
                event,
            )?);
        }
        self.heads.insert(aggregate_id, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pinged {
        n: u32,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    fn ping(n: u32) -> Pinged {
        Pinged {
            n,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn staged_events_get_gap_free_sequences() {
        let mut journal = EventJournal::new();
        let id = Uuid::now_v7();

        let mut staged = StagedEvents::default();
        staged
            .stage(&journal, "test", id, ExpectedVersion::Exact(0), &[ping(1), ping(2)])
            .unwrap();
        staged
            .stage(&journal, "test", id, ExpectedVersion::Exact(2), &[ping(3)])
            .unwrap();
        assert!(journal.is_empty());
        journal.commit(staged);

        let stream = journal.stream(id);
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(stream[2].decode::<Pinged>().unwrap().n, 3);
        assert_eq!(journal.current_version(id), 3);
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let mut journal = EventJournal::new();
        let id = Uuid::now_v7();
        let mut staged = StagedEvents::default();
        staged
            .stage(&journal, "test", id, ExpectedVersion::Any, &[ping(1)])
            .unwrap();
        journal.commit(staged);

        let mut staged = StagedEvents::default();
        let err = staged
            .stage(&journal, "test", id, ExpectedVersion::Exact(0), &[ping(2)])
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn stream_type_is_stable() {
        let mut journal = EventJournal::new();
        let id = Uuid::now_v7();
        let mut staged = StagedEvents::default();
        staged
            .stage(&journal, "a", id, ExpectedVersion::Any, &[ping(1)])
            .unwrap();
        journal.commit(staged);

        let mut staged = StagedEvents::default();
        assert!(staged
            .stage(&journal, "b", id, ExpectedVersion::Any, &[ping(2)])
            .is_err());
    }
}
