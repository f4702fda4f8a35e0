//! Job queue
//!
//! At-least-once delivery of [`JobDescriptor`]s from the submitter to workers.
//! A delivery stays owned by its worker until acknowledged; deliveries that are
//! never acknowledged are handed out again.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parcel_core::dto::job::JobDescriptor;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A descriptor handed to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle used to acknowledge this delivery
    pub receipt: Uuid,
    pub descriptor: JobDescriptor,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<()>;

    /// Wait for the next descriptor
    async fn dequeue(&self) -> Result<Delivery>;

    /// Confirm a delivery was fully handled so it is never redelivered
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<(JobDescriptor, u32)>,
    in_flight: HashMap<Uuid, Delivery>,
    closed: bool,
}

/// In-process queue
///
/// Redelivery is explicit through [`MemoryJobQueue::requeue_unacked`], which
/// stands in for a broker noticing a dead consumer.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptors waiting for a worker
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of delivered but unacknowledged descriptors
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Put every unacknowledged delivery back at the head of the queue
    pub async fn requeue_unacked(&self) -> usize {
        let mut state = self.state.lock().await;
        let pending: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
        let count = pending.len();
        for delivery in pending {
            state
                .ready
                .push_front((delivery.descriptor, delivery.attempt + 1));
        }
        drop(state);

        for _ in 0..count {
            self.notify.notify_one();
        }
        count
    }

    /// Refuse further work and wake every blocked consumer
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::QueueClosed);
        }
        state.ready.push_back((descriptor.clone(), 1));
        drop(state);

        debug!(job_id = %descriptor.job_id, "Job enqueued");
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Delivery> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some((descriptor, attempt)) = state.ready.pop_front() {
                    let delivery = Delivery {
                        receipt: Uuid::new_v4(),
                        descriptor,
                        attempt,
                    };
                    state.in_flight.insert(delivery.receipt, delivery.clone());
                    return Ok(delivery);
                }
                if state.closed {
                    return Err(StoreError::QueueClosed);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().await.in_flight.remove(&delivery.receipt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::domain::artifact::ArtifactName;
    use parcel_core::domain::job::JobId;
    use std::sync::Arc;
    use std::time::Duration;

    fn descriptor() -> JobDescriptor {
        JobDescriptor {
            job_id: JobId::new(),
            input: ArtifactName::for_upload("a.txt"),
            original_filename: "a.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = MemoryJobQueue::new();
        let first = descriptor();
        let second = descriptor();
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().descriptor, first);
        assert_eq!(queue.dequeue().await.unwrap().descriptor, second);
        assert_eq!(queue.in_flight().await, 2);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(MemoryJobQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        let job = descriptor();
        queue.enqueue(&job).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.descriptor, job);
        assert_eq!(delivery.attempt, 1);
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered() {
        let queue = MemoryJobQueue::new();
        let job = descriptor();
        queue.enqueue(&job).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(queue.requeue_unacked().await, 1);

        let second = queue.dequeue().await.unwrap();
        assert_eq!(second.descriptor, job);
        assert_eq!(second.attempt, 2);
        assert_ne!(second.receipt, first.receipt);
    }

    #[tokio::test]
    async fn test_acked_delivery_is_gone() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&descriptor()).await.unwrap();

        let delivery = queue.dequeue().await.unwrap();
        queue.ack(&delivery).await.unwrap();

        assert_eq!(queue.in_flight().await, 0);
        assert_eq!(queue.requeue_unacked().await, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_wakes_consumers() {
        let queue = Arc::new(MemoryJobQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(StoreError::QueueClosed)));
        assert!(matches!(
            queue.enqueue(&descriptor()).await,
            Err(StoreError::QueueClosed)
        ));
    }
}
