use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::broker::{Broker, Delivery, Receipt};
use crate::error::MqError;

const DEFAULT_GROUP: &str = "default";

struct Record {
    key: String,
    payload: Vec<u8>,
}

type Position = (usize, usize);

/// Commit state of one consumer group.
#[derive(Default)]
struct GroupCommits {
    /// Per partition, the offset below which every record is committed.
    low_water: HashMap<usize, usize>,
    /// Committed offsets at or above their partition's low-water mark.
    ahead: HashSet<Position>,
}

impl GroupCommits {
    fn contains(&self, (partition, offset): Position) -> bool {
        offset < self.low_water.get(&partition).copied().unwrap_or(0)
            || self.ahead.contains(&(partition, offset))
    }

    fn insert(&mut self, (partition, offset): Position) {
        self.ahead.insert((partition, offset));
        let low = self.low_water.entry(partition).or_insert(0);
        while self.ahead.remove(&(partition, *low)) {
            *low += 1;
        }
    }
}

#[derive(Default)]
struct LogState {
    partitions: Vec<Vec<Record>>,
    committed: HashMap<String, GroupCommits>,
    /// Delivery counts of uncommitted records, per group and position.
    deliveries: HashMap<(String, Position), u32>,
}

impl LogState {
    fn is_committed(&self, group: &str, pos: Position) -> bool {
        self.committed
            .get(group)
            .is_some_and(|commits| commits.contains(pos))
    }

    fn commit(&mut self, group: &str, pos: Position) {
        self.committed
            .entry(group.to_string())
            .or_default()
            .insert(pos);
        self.deliveries.remove(&(group.to_string(), pos));
    }

    fn deliver(&mut self, group: &str, (partition, offset): Position) -> Delivery {
        let attempt = self
            .deliveries
            .entry((group.to_string(), (partition, offset)))
            .or_insert(0);
        *attempt += 1;
        let record = &self.partitions[partition][offset];
        Delivery::new(
            record.key.clone(),
            record.payload.clone(),
            *attempt,
            Receipt::Memory { partition, offset },
        )
    }
}

struct SharedLog {
    state: Mutex<LogState>,
    notify: Notify,
}

/// Read position of one consumer instance.
struct Cursor {
    positions: Vec<usize>,
    next_partition: usize,
}

impl Cursor {
    fn new(partitions: usize) -> Self {
        Self {
            positions: vec![0; partitions],
            next_partition: 0,
        }
    }
}

/// In-process partitioned log.
///
/// Keys hash to a partition, so records sharing a key keep their send order. Each
/// handle is one consumer instance of a consumer group; commits are tracked per
/// group and record. A fresh handle for the same group (see [`MemoryBroker::restart`])
/// starts from the beginning of the log and skips everything the group committed,
/// which is how uncommitted work survives a consumer restart. Releasing a delivery
/// leaves it pending for the group without rewinding the current instance, so a
/// failing record does not block the records behind it.
///
/// Commit bookkeeping stays bounded by the uncommitted window, but records are
/// kept for the life of the process. Meant for development and tests.
pub struct MemoryBroker {
    shared: Arc<SharedLog>,
    group: String,
    cursor: Mutex<Cursor>,
    partitions: usize,
}

impl MemoryBroker {
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        let state = LogState {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
            ..Default::default()
        };
        Self {
            shared: Arc::new(SharedLog {
                state: Mutex::new(state),
                notify: Notify::new(),
            }),
            group: DEFAULT_GROUP.to_string(),
            cursor: Mutex::new(Cursor::new(partitions)),
            partitions,
        }
    }

    /// A new consumer instance in `group`, sharing this log.
    pub fn consumer(&self, group: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            group: group.to_string(),
            cursor: Mutex::new(Cursor::new(self.partitions)),
            partitions: self.partitions,
        }
    }

    /// A new consumer instance in this handle's group.
    pub fn restart(&self) -> Self {
        self.consumer(&self.group)
    }

    /// Uncommitted records of this handle's group as `(key, payload)`, partition by partition.
    pub async fn backlog(&self) -> Vec<(String, Vec<u8>)> {
        let state = self.shared.state.lock().await;
        let mut out = Vec::new();
        for (partition, records) in state.partitions.iter().enumerate() {
            for (offset, record) in records.iter().enumerate() {
                if !state.is_committed(&self.group, (partition, offset)) {
                    out.push((record.key.clone(), record.payload.clone()));
                }
            }
        }
        out
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    async fn try_next(&self) -> Option<Delivery> {
        let mut cursor = self.cursor.lock().await;
        let mut state = self.shared.state.lock().await;

        for i in 0..self.partitions {
            let partition = (cursor.next_partition + i) % self.partitions;
            while cursor.positions[partition] < state.partitions[partition].len() {
                let offset = cursor.positions[partition];
                cursor.positions[partition] += 1;
                if !state.is_committed(&self.group, (partition, offset)) {
                    cursor.next_partition = (partition + 1) % self.partitions;
                    return Some(state.deliver(&self.group, (partition, offset)));
                }
            }
        }
        None
    }
}

fn memory_position(delivery: &Delivery) -> Result<Position, MqError> {
    match delivery.receipt {
        Receipt::Memory { partition, offset } => Ok((partition, offset)),
        _ => Err(MqError::ForeignDelivery),
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), MqError> {
        let partition = self.partition_for(key);
        {
            let mut state = self.shared.state.lock().await;
            state.partitions[partition].push(Record {
                key: key.to_string(),
                payload: payload.to_vec(),
            });
        }
        debug!(key, partition, "Record appended");
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery, MqError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_next().await {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn commit(&self, delivery: Delivery) -> Result<(), MqError> {
        let pos = memory_position(&delivery)?;
        self.shared.state.lock().await.commit(&self.group, pos);
        Ok(())
    }

    async fn release(&self, delivery: Delivery) -> Result<(), MqError> {
        let (partition, offset) = memory_position(&delivery)?;
        debug!(
            key = delivery.key(),
            partition, offset, "Delivery released, pending until restart"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn receive_now(broker: &MemoryBroker) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_millis(50), broker.receive())
            .await
            .ok()
            .map(|d| d.unwrap())
    }

    #[tokio::test]
    async fn test_same_key_keeps_send_order() {
        let broker = MemoryBroker::new(4);
        for i in 0..5u8 {
            broker.send("asset-1", &[i]).await.unwrap();
        }
        for i in 0..5u8 {
            let d = broker.receive().await.unwrap();
            assert_eq!(d.key(), "asset-1");
            assert_eq!(d.payload(), &[i]);
            broker.commit(d).await.unwrap();
        }
        assert!(receive_now(&broker).await.is_none());
    }

    #[tokio::test]
    async fn test_restart_redelivers_only_uncommitted() {
        let broker = MemoryBroker::new(1);
        broker.send("a", b"A").await.unwrap();
        broker.send("b", b"B").await.unwrap();

        let a = broker.receive().await.unwrap();
        let b = broker.receive().await.unwrap();
        broker.commit(b).await.unwrap();
        drop(a);

        let restarted = broker.restart();
        let again = receive_now(&restarted).await.unwrap();
        assert_eq!(again.payload(), b"A");
        assert_eq!(again.attempt(), 2);
        assert!(receive_now(&restarted).await.is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_record_pending() {
        let broker = MemoryBroker::new(2);
        broker.send("k", b"x").await.unwrap();

        let first = broker.receive().await.unwrap();
        assert_eq!(first.attempt(), 1);
        broker.release(first).await.unwrap();
        assert!(receive_now(&broker).await.is_none());
        assert_eq!(broker.backlog().await.len(), 1);

        let second = receive_now(&broker.restart()).await.unwrap();
        assert_eq!(second.payload(), b"x");
        assert_eq!(second.attempt(), 2);
    }

    #[tokio::test]
    async fn test_groups_commit_independently() {
        let broker = MemoryBroker::new(1);
        broker.send("k", b"x").await.unwrap();

        let d = broker.receive().await.unwrap();
        broker.commit(d).await.unwrap();
        assert!(broker.backlog().await.is_empty());

        let other = broker.consumer("audit");
        assert_eq!(other.backlog().await.len(), 1);
        assert!(receive_now(&other).await.is_some());
    }

    #[tokio::test]
    async fn test_commit_state_compacts_behind_low_water_mark() {
        let broker = MemoryBroker::new(1);
        for i in 0..4u8 {
            broker.send("k", &[i]).await.unwrap();
        }
        let mut pending = Vec::new();
        for _ in 0..4 {
            pending.push(broker.receive().await.unwrap());
        }

        // Commit out of order: 1 and 3 first, then 0 and 2.
        let last = pending.pop().unwrap();
        let third = pending.pop().unwrap();
        let second = pending.pop().unwrap();
        let first = pending.pop().unwrap();
        broker.commit(second).await.unwrap();
        broker.commit(last).await.unwrap();
        {
            let state = broker.shared.state.lock().await;
            let commits = &state.committed[DEFAULT_GROUP];
            assert_eq!(commits.ahead.len(), 2);
            assert_eq!(commits.low_water.get(&0).copied().unwrap_or(0), 0);
        }

        broker.commit(first).await.unwrap();
        broker.commit(third).await.unwrap();

        let state = broker.shared.state.lock().await;
        let commits = &state.committed[DEFAULT_GROUP];
        assert!(commits.ahead.is_empty());
        assert_eq!(commits.low_water[&0], 4);
        assert!(state.deliveries.is_empty());
        drop(state);

        assert!(broker.backlog().await.is_empty());
        assert!(receive_now(&broker.restart()).await.is_none());
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let broker = Arc::new(MemoryBroker::new(2));
        let rx = Arc::clone(&broker);
        let handle = tokio::spawn(async move { rx.receive().await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.send("late", b"y").await.unwrap();

        let d = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.key(), "late");
    }
}
