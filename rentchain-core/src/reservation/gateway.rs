//! Collaborators of the orchestrator: the property calendar and the user directory.
//!
//! Both are traits so the booking service can run next to an in-process
//! [`LockManager`] or talk to a remote property service over HTTP.

use crate::calendar::lock_manager::LockManager;
use crate::calendar::{DateRange, LockError};
use rentchain_sdk::client::{ClientError, PropertyClient, UserClient};
use rentchain_sdk::objects::{
    BookedByQuery, CommitDatesRequest, LockDatesRequest, LockDatesResponse, PropertySnapshot,
    ReleaseDatesRequest, TenantProfile, UnbookDatesRequest,
};
use reqwest::StatusCode;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("dates are not available")]
    Unavailable,

    #[error("lock token is invalid or expired")]
    InvalidOrExpiredLock,

    #[error("{0}")]
    NotFound(String),

    /// The collaborator refused the request as malformed.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<LockError> for GatewayError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Unavailable => GatewayError::Unavailable,
            LockError::InvalidOrExpiredLock => GatewayError::InvalidOrExpiredLock,
            LockError::PropertyNotFound(id) => GatewayError::NotFound(format!("property {id} not found")),
            LockError::InvalidRange { .. }
            | LockError::RangeTooLong { .. }
            | LockError::NotOwner { .. }
            | LockError::MinimumStay { .. } => GatewayError::Rejected(err.to_string()),
            LockError::Store(e) => GatewayError::Transport(e.to_string()),
        }
    }
}

impl From<ClientError> for GatewayError {
    fn from(err: ClientError) -> Self {
        match err.status() {
            Some(StatusCode::CONFLICT) => GatewayError::Unavailable,
            Some(StatusCode::GONE) => GatewayError::InvalidOrExpiredLock,
            Some(StatusCode::NOT_FOUND) => GatewayError::NotFound(
                err.error_body()
                    .map(|b| b.message)
                    .unwrap_or_else(|| "resource not found".to_string()),
            ),
            Some(status) if status.is_client_error() => GatewayError::Rejected(err.to_string()),
            _ => GatewayError::Transport(err.to_string()),
        }
    }
}

/// The property side of the saga as seen by the booking service.
#[async_trait::async_trait]
pub trait PropertyGateway: Send + Sync {
    async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, GatewayError>;

    async fn lock(
        &self,
        property_id: i64,
        range: DateRange,
        tenant_id: i64,
    ) -> Result<LockDatesResponse, GatewayError>;

    async fn commit(
        &self,
        property_id: i64,
        range: DateRange,
        lock_token: Uuid,
        tx_hash: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Idempotent.
    async fn release(&self, property_id: i64, lock_token: Uuid) -> Result<(), GatewayError>;

    async fn unbook(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<(), GatewayError>;

    /// Whether the whole range is already committed for `holder_id`.
    async fn booked_by(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<bool, GatewayError>;
}

/// Gateway over a lock manager living in the same process.
#[derive(Clone)]
pub struct LocalPropertyGateway {
    locks: LockManager,
}

impl LocalPropertyGateway {
    pub fn new(locks: LockManager) -> Self {
        Self { locks }
    }
}

#[async_trait::async_trait]
impl PropertyGateway for LocalPropertyGateway {
    async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, GatewayError> {
        Ok(self.locks.snapshot(property_id).await?)
    }

    async fn lock(
        &self,
        property_id: i64,
        range: DateRange,
        tenant_id: i64,
    ) -> Result<LockDatesResponse, GatewayError> {
        let grant = self.locks.lock(property_id, range, tenant_id).await?;
        Ok(LockDatesResponse {
            lock_token: grant.lock_token,
            expires_at: grant.expires_at.unix_timestamp(),
        })
    }

    async fn commit(
        &self,
        property_id: i64,
        range: DateRange,
        lock_token: Uuid,
        tx_hash: Option<&str>,
    ) -> Result<(), GatewayError> {
        tracing::debug!(property_id, lock_token = %lock_token, tx_hash, "Committing lock");
        Ok(self.locks.commit(property_id, lock_token, Some(range)).await?)
    }

    async fn release(&self, property_id: i64, lock_token: Uuid) -> Result<(), GatewayError> {
        self.locks.release(property_id, lock_token).await?;
        Ok(())
    }

    async fn unbook(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<(), GatewayError> {
        self.locks.unbook(property_id, range, holder_id).await?;
        Ok(())
    }

    async fn booked_by(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<bool, GatewayError> {
        Ok(self.locks.is_booked_by(property_id, range, holder_id).await?)
    }
}

/// Gateway over the property service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpPropertyGateway {
    client: PropertyClient,
}

impl HttpPropertyGateway {
    pub fn new(client: PropertyClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PropertyGateway for HttpPropertyGateway {
    async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, GatewayError> {
        Ok(self.client.snapshot(property_id).await?)
    }

    async fn lock(
        &self,
        property_id: i64,
        range: DateRange,
        tenant_id: i64,
    ) -> Result<LockDatesResponse, GatewayError> {
        let body = LockDatesRequest {
            check_in: range.start,
            check_out: range.end,
            tenant_id,
        };
        Ok(self.client.lock(property_id, &body).await?)
    }

    async fn commit(
        &self,
        property_id: i64,
        range: DateRange,
        lock_token: Uuid,
        tx_hash: Option<&str>,
    ) -> Result<(), GatewayError> {
        let body = CommitDatesRequest {
            start_date: range.start,
            end_date: range.end,
            lock_token,
            tx_hash: tx_hash.map(str::to_string),
        };
        Ok(self.client.commit(property_id, &body).await?)
    }

    async fn release(&self, property_id: i64, lock_token: Uuid) -> Result<(), GatewayError> {
        let body = ReleaseDatesRequest { lock_token };
        Ok(self.client.release(property_id, &body).await?)
    }

    async fn unbook(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<(), GatewayError> {
        let body = UnbookDatesRequest {
            start_date: range.start,
            end_date: range.end,
            holder_id,
        };
        Ok(self.client.unbook(property_id, &body).await?)
    }

    async fn booked_by(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<bool, GatewayError> {
        let query = BookedByQuery {
            start_date: range.start,
            end_date: range.end,
            holder_id,
        };
        Ok(self.client.booked_by(property_id, &query).await?.booked)
    }
}

/// Lookup of tenant wallet and verification state.
#[async_trait::async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant(&self, user_id: i64) -> Result<TenantProfile, GatewayError>;
}

#[async_trait::async_trait]
impl TenantDirectory for UserClient {
    async fn tenant(&self, user_id: i64) -> Result<TenantProfile, GatewayError> {
        Ok(self.tenant_profile(user_id).await?)
    }
}

/// Fixed set of tenant profiles.
#[derive(Debug, Default)]
pub struct MemoryTenantDirectory {
    tenants: RwLock<HashMap<i64, TenantProfile>>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: TenantProfile) {
        self.tenants.write().await.insert(profile.id, profile);
    }
}

#[async_trait::async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn tenant(&self, user_id: i64) -> Result<TenantProfile, GatewayError> {
        self.tenants
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("user {user_id} not found")))
    }
}
