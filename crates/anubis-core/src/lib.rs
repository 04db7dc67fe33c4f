//! Anubis client core
//!
//! Registration validation and channel synchronisation for a chat client
//! whose auth, storage and push fan-out live in a hosted backend. The
//! backend is reached only through [`service::ChatService`]; rendering code
//! only ever sees read-only snapshots and [`sync::SyncEvent`]s.

pub mod config;
pub mod error;
pub mod live;
pub mod notice;
pub mod password;
pub mod reconcile;
pub mod registration;
pub mod service;
pub mod sync;
pub mod workspace;

pub use config::{ClientConfig, LiveUpdate, RegistrationConfig, SyncConfig};
pub use error::{ClientError, ServiceError};
pub use registration::{Field, FieldState, FieldStatus, RegistrationForm, RegistrationValidator};
pub use service::{ChatService, SnapshotStream};
pub use sync::{ChannelSync, SessionState, SyncEvent, UpdateOutcome};
pub use workspace::{Workspace, WorkspaceUpdate};
