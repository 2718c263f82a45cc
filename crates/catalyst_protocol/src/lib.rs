//! # Catalyst Protocol
//!
//! Data model shared by every catalyst content node.
//!
//! This crate provides:
//! - `Entity` and `EntityType`, the content-addressed documents
//! - `AuditInfo` and the authorization chain attached to each deployment
//! - `DeploymentWithAuditInfo` and the paginated peer protocol records
//! - `SynchronizationState` reported by the cluster sync engine
//! - Content-address (CIDv1) hashing helpers
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod deployment;
mod entity;
mod error;
pub mod hashing;
mod state;

pub use audit::{AuditInfo, AuthChain, AuthLink, AuthLinkType, EntityVersion, MigrationData};
pub use deployment::{
    DeploymentFiles, DeploymentWithAuditInfo, DeploymentsPage, DeploymentsRequest, Pagination,
    ServerAddress,
};
pub use entity::{ContentHash, Entity, EntityId, EntityType, Pointer, Timestamp};
pub use error::{ProtocolError, ProtocolResult};
pub use state::SynchronizationState;

/// Version of the catalyst crates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
