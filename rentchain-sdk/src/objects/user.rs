//! User service types consumed by the booking flow.

use serde::{Deserialize, Serialize};

/// What the booking flow needs to know about a tenant.
///
/// Returned by the user service at `GET /internal/users/{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: i64,
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub wallet_verified: bool,
    #[serde(default)]
    pub kyc_complete: bool,
}

impl TenantProfile {
    /// Whether the tenant may start a booking.
    pub fn is_eligible(&self) -> bool {
        self.wallet_verified
            && self.kyc_complete
            && self
                .wallet_address
                .as_deref()
                .is_some_and(|w| !w.trim().is_empty())
    }
}
