//! # causerie-backend
//!
//! The boundary to the hosted backend-as-a-service: the
//! [`IdentityProvider`] and [`DocumentStore`] traits, the [`Subscription`]
//! cancellation handle shared by every live query, and the
//! [`SessionGateway`] that maps provider identities to mirrored profiles.
//!
//! Everything here is contract; the actual fan-out lives behind the
//! traits (see `causerie-memory` for the in-process implementation).

pub mod documents;
pub mod gateway;
pub mod provider;
pub mod subscription;

pub use documents::DocumentStore;
pub use gateway::{validate_registration, SessionGateway};
pub use provider::{IdentityProvider, ProviderIdentity};
pub use subscription::{CancelFlag, SnapshotSink, Subscription};
