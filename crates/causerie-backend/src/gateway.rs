//! Session gateway: provider sign-in/sign-up/sign-out plus the lazy
//! mirroring of provider identities into profile records.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use causerie_shared::constants::{FALLBACK_DISPLAY_NAME, MIN_PASSWORD_LEN};
use causerie_shared::{AuthError, UserProfile, ValidationError};

use crate::documents::DocumentStore;
use crate::provider::{IdentityProvider, ProviderIdentity};
use crate::subscription::{SnapshotSink, Subscription};

/// Wraps the identity provider and keeps the profile collection in sync
/// with it.
#[derive(Clone)]
pub struct SessionGateway {
    provider: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
}

impl SessionGateway {
    pub fn new(provider: Arc<dyn IdentityProvider>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            provider,
            documents,
        }
    }

    /// Authenticate with email and password, then return the mirrored
    /// profile, creating it on first sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let identity = self.provider.sign_in(email, password).await?;
        self.mirror_profile(identity).await
    }

    /// Register a new account and create its profile record.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile, AuthError> {
        let identity = self.provider.sign_up(email, password, display_name).await?;
        self.mirror_profile(identity).await
    }

    /// Drive the provider's federated flow, then mirror the profile.
    pub async fn sign_in_federated(&self) -> Result<UserProfile, AuthError> {
        let identity = self.provider.sign_in_federated().await?;
        self.mirror_profile(identity).await
    }

    /// Invalidate the external session.
    ///
    /// This never touches the profile's online flag: after sign-out the
    /// session has no write permission on its own record, so callers
    /// that want to go offline must flip presence FIRST.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.provider.send_password_reset(email).await
    }

    /// Observe session transitions as resolved profiles.
    ///
    /// Transitions are resolved strictly one at a time, so a signed-out
    /// transition can never overtake an earlier signed-in one whose
    /// profile lookup is still in flight.  Resolution failures are logged
    /// and forwarded as `None`.
    pub fn observe_auth_state(&self, sink: SnapshotSink<Option<UserProfile>>) -> Subscription {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Option<ProviderIdentity>>();
        let provider_sub = self.provider.observe_auth_state(raw_tx);

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (sub, _flag) = Subscription::with_teardown(move || {
            let _ = stop_tx.send(());
        });

        let gateway = self.clone();
        tokio::spawn(async move {
            // Held so the provider-side registration is torn down when
            // this task exits.
            let _provider_sub = provider_sub;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    transition = raw_rx.recv() => {
                        let identity = match transition {
                            Some(identity) => identity,
                            None => break,
                        };

                        let resolved = match identity {
                            None => None,
                            Some(identity) => match gateway.mirror_profile(identity).await {
                                Ok(profile) => Some(profile),
                                Err(e) => {
                                    warn!(error = %e, "Failed to resolve profile for auth transition");
                                    None
                                }
                            },
                        };

                        if sink.send(resolved).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        sub
    }

    /// Look up the profile record for a provider identity, creating it
    /// with `is_online = true` if this is the first sign-in.
    async fn mirror_profile(&self, identity: ProviderIdentity) -> Result<UserProfile, AuthError> {
        let existing = self
            .documents
            .get_user_by_id(&identity.uid)
            .await
            .map_err(AuthError::Profile)?;

        match existing {
            Some(profile) => {
                self.documents
                    .set_user_presence(&identity.uid, true)
                    .await
                    .map_err(AuthError::Profile)?;
                Ok(UserProfile {
                    is_online: true,
                    last_seen: Utc::now(),
                    ..profile
                })
            }
            None => {
                let now = Utc::now();
                let profile = UserProfile {
                    id: identity.uid,
                    display_name: display_name_for(&identity),
                    email: identity.email.clone().unwrap_or_default(),
                    avatar_url: identity.photo_url.clone(),
                    is_online: true,
                    last_seen: now,
                    created_at: now,
                };
                self.documents
                    .upsert_user(&profile)
                    .await
                    .map_err(AuthError::Profile)?;
                Ok(profile)
            }
        }
    }
}

/// Provider display name, else the email's local part, else the fallback.
fn display_name_for(identity: &ProviderIdentity) -> String {
    if let Some(name) = identity.display_name.as_deref() {
        if !name.trim().is_empty() {
            return name.to_string();
        }
    }
    if let Some(email) = identity.email.as_deref() {
        if let Some(local) = email.split('@').next() {
            if !local.is_empty() {
                return local.to_string();
            }
        }
    }
    FALLBACK_DISPLAY_NAME.to_string()
}

/// Caller-local registration checks, run by the presentation layer before
/// any intent reaches the gateway.
pub fn validate_registration(
    email: &str,
    password: &str,
    confirmation: &str,
    display_name: &str,
) -> Result<(), ValidationError> {
    if display_name.trim().is_empty() {
        return Err(ValidationError::EmptyDisplayName);
    }

    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(ValidationError::InvalidEmail),
    }

    if password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }

    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }

    Ok(())
}
