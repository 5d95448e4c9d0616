//! Identity provider boundary.
//!
//! The provider owns credentials, session tokens, and the federated
//! sign-in flow; this crate only sees the opaque identity it returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use causerie_shared::{AuthError, UserId};

use crate::subscription::{SnapshotSink, Subscription};

/// The identity a provider reports for an authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdentity {
    pub uid: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

/// External identity provider operations.
///
/// `observe_auth_state` replays the current state to a freshly registered
/// sink and then delivers one `Option<ProviderIdentity>` per session
/// transition, in order.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderIdentity, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<ProviderIdentity, AuthError>;

    /// Drive the provider's federated (pop-up) flow.  Fails with
    /// [`AuthError::FlowCancelled`] when the user abandons it.
    async fn sign_in_federated(&self) -> Result<ProviderIdentity, AuthError>;

    /// Invalidate the current session.  Callers that need to write their
    /// own profile record (e.g. to go offline) must do so BEFORE this.
    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    fn observe_auth_state(&self, sink: SnapshotSink<Option<ProviderIdentity>>) -> Subscription;
}
