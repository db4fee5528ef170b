use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use serde_json::Value;
use thiserror::Error;

use crate::entity::request;

/// Status given to a request created without one.
pub const DEFAULT_STATUS: &str = "pending";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request '{0}' already exists")]
    Conflict(String),
    #[error("Request '{0}' not found")]
    NotFound(String),
    #[error("Database unavailable: {0}")]
    Unavailable(DbErr),
    #[error("Database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => StoreError::Unavailable(err),
            other => StoreError::Database(other),
        }
    }
}

/// Fields of a request that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub name: String,
    pub payload: Value,
    pub status: Option<String>,
}

/// Replacement payload and optional new status for an existing request.
#[derive(Debug, Clone)]
pub struct RequestChanges {
    pub payload: Value,
    pub status: Option<String>,
}

/// Persistence for request records, keyed by name.
///
/// Generic over the connection so callers can run it inside a transaction.
pub struct RequestStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> RequestStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a new record. Name uniqueness is enforced by the database, so
    /// of two concurrent creates with the same name exactly one succeeds.
    pub async fn create(&self, new: NewRequest) -> Result<request::Model, StoreError> {
        let now = Utc::now();
        let model = request::ActiveModel {
            name: Set(new.name.clone()),
            payload: Set(new.payload),
            status: Set(new.status.unwrap_or_else(|| DEFAULT_STATUS.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(StoreError::Conflict(new.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, name: &str) -> Result<request::Model, StoreError> {
        request::Entity::find()
            .filter(request::Column::Name.eq(name))
            .one(self.conn)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Result<Vec<request::Model>, StoreError> {
        Ok(request::Entity::find()
            .order_by_asc(request::Column::Id)
            .all(self.conn)
            .await?)
    }

    /// Replace the payload (and status, when given) and refresh `updated_at`.
    pub async fn update(
        &self,
        name: &str,
        changes: RequestChanges,
    ) -> Result<request::Model, StoreError> {
        let existing = self.get(name).await?;

        let mut active: request::ActiveModel = existing.into();
        active.payload = Set(changes.payload);
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());

        match active.update(self.conn).await {
            Ok(updated) => Ok(updated),
            // Deleted between the lookup and the update.
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the record and return what was removed.
    pub async fn delete(&self, name: &str) -> Result<request::Model, StoreError> {
        let existing = self.get(name).await?;

        let result = request::Entity::delete_many()
            .filter(request::Column::Id.eq(existing.id))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(existing)
    }
}
