//! PostgreSQL job queue
//!
//! Each row is one pending descriptor. A consumer leases a row by stamping it
//! with a fresh receipt and a lease deadline; acknowledging deletes the row.
//! Rows whose lease expired without an ack are handed out again. A row whose
//! payload is not a descriptor can never be processed, so it is dropped when
//! claimed.

use std::time::Duration;

use async_trait::async_trait;
use parcel_core::dto::job::JobDescriptor;
use sqlx::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::Result;
use crate::queue::{Delivery, JobQueue};

/// Default sleep between claim attempts on an empty queue
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default lease of a delivery before it is handed out again
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    poll_interval: Duration,
    visibility_timeout: Duration,
}

impl PgJobQueue {
    /// # Arguments
    /// * `poll_interval` - How long `dequeue` sleeps when the queue is empty
    /// * `visibility_timeout` - How long a delivery stays leased before redelivery
    pub fn new(pool: PgPool, poll_interval: Duration, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            visibility_timeout,
        }
    }

    /// Queue for processes that only enqueue, such as the HTTP server
    pub fn producer(pool: PgPool) -> Self {
        Self::new(pool, DEFAULT_POLL_INTERVAL, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    /// Lease the oldest available row, if any
    async fn try_claim(&self) -> Result<Option<Delivery>> {
        loop {
            let receipt = Uuid::new_v4();
            let Some((payload, attempts)) = self.lease_row(receipt).await? else {
                return Ok(None);
            };

            match decode_payload(payload) {
                Ok(descriptor) => {
                    return Ok(Some(Delivery {
                        receipt,
                        descriptor,
                        attempt: attempts.max(1) as u32,
                    }));
                }
                Err(e) => {
                    error!(%receipt, error = %e, "Dropping queue entry with malformed payload");
                    self.delete_leased(receipt).await?;
                }
            }
        }
    }

    async fn lease_row(&self, receipt: Uuid) -> Result<Option<(serde_json::Value, i32)>> {
        let row = sqlx::query_as(
            r#"
            UPDATE job_queue
            SET attempts = attempts + 1,
                receipt = $1,
                leased_until = now() + make_interval(secs => $2)
            WHERE id = (
                SELECT id FROM job_queue
                WHERE leased_until IS NULL OR leased_until < now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload, attempts
            "#,
        )
        .bind(receipt)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete_leased(&self, receipt: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_queue WHERE receipt = $1")
            .bind(receipt)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn decode_payload(payload: serde_json::Value) -> serde_json::Result<JobDescriptor> {
    serde_json::from_value(payload)
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<()> {
        sqlx::query("INSERT INTO job_queue (job_id, payload) VALUES ($1, $2)")
            .bind(descriptor.job_id.as_uuid())
            .bind(serde_json::to_value(descriptor)?)
            .execute(&self.pool)
            .await?;

        debug!(job_id = %descriptor.job_id, "Job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.try_claim().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        if self.delete_leased(delivery.receipt).await? == 0 {
            debug!(
                job_id = %delivery.descriptor.job_id,
                "Ack for an expired lease; the row was already redelivered"
            );
        }
        Ok(())
    }
}
