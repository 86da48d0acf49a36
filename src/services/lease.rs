//! Per-upload assembly leases backed by SQLite.
//!
//! A lease row exists while one caller assembles an upload. Acquisition is a
//! conditional upsert that only wins when no row exists or the existing row
//! has expired, so two processes sharing the database never assemble the
//! same upload at once. A lease dropped without `release` (for example when
//! the request future is cancelled) is released from a spawned task; a holder
//! whose process dies is replaced once its lease expires.

use crate::models::chunk::UploadId;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("assembly of `{0}` is already in progress")]
    InProgress(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct AssemblyLeases {
    db: Arc<SqlitePool>,
    ttl: Duration,
}

/// Proof of exclusive assembly rights for one upload.
#[must_use = "a lease should be released once assembly finishes"]
#[derive(Debug)]
pub struct Lease {
    db: Arc<SqlitePool>,
    upload_id: String,
    holder: Uuid,
    released: bool,
}

impl AssemblyLeases {
    pub fn new(db: Arc<SqlitePool>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub async fn acquire(&self, upload_id: &UploadId) -> Result<Lease, LeaseError> {
        let holder = Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        let result = sqlx::query(
            r#"
            INSERT INTO assembly_leases (upload_id, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(upload_id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE assembly_leases.expires_at <= ?
            "#,
        )
        .bind(upload_id.as_str())
        .bind(holder.to_string())
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LeaseError::InProgress(upload_id.to_string()));
        }

        debug!(upload_id = %upload_id, %holder, "acquired assembly lease");
        Ok(Lease {
            db: self.db.clone(),
            upload_id: upload_id.to_string(),
            holder,
            released: false,
        })
    }
}

impl Lease {
    /// Whether this holder still owns the lease and it has not expired.
    pub async fn is_held(&self) -> Result<bool, LeaseError> {
        let now = Utc::now().timestamp_millis();
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM assembly_leases WHERE upload_id = ? AND holder = ? AND expires_at > ?",
        )
        .bind(&self.upload_id)
        .bind(self.holder.to_string())
        .bind(now)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.is_some())
    }

    /// Give up the lease. Only removes the row if this holder still owns it.
    pub async fn release(mut self) {
        self.released = true;
        delete_lease(&self.db, &self.upload_id, self.holder).await;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(upload_id = %self.upload_id, "assembly lease dropped outside a runtime, left to expire");
            return;
        };
        let db = self.db.clone();
        let upload_id = std::mem::take(&mut self.upload_id);
        let holder = self.holder;
        debug!(upload_id = %upload_id, "assembly lease dropped, releasing in background");
        runtime.spawn(async move {
            delete_lease(&db, &upload_id, holder).await;
        });
    }
}

async fn delete_lease(db: &SqlitePool, upload_id: &str, holder: Uuid) {
    let result = sqlx::query("DELETE FROM assembly_leases WHERE upload_id = ? AND holder = ?")
        .bind(upload_id)
        .bind(holder.to_string())
        .execute(db)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            warn!(upload_id = %upload_id, "assembly lease expired before release");
        }
        Ok(_) => debug!(upload_id = %upload_id, "released assembly lease"),
        Err(err) => {
            warn!(upload_id = %upload_id, error = %err, "failed to release assembly lease");
        }
    }
}
