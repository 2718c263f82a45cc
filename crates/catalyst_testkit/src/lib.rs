//! # Catalyst Testkit
//!
//! Test utilities for catalyst content nodes.
//!
//! This crate provides:
//! - Signing identities and entity/deployment builders
//! - Metadata documents that pass the standard schemas
//! - A configurable stub of the validation pipeline's external calls
//! - Property-based test generators using proptest
//! - In-memory sync nodes wired to mock peers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catalyst_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn scene_is_valid() {
//!     let signer = Identity::generate();
//!     let deployment = EntityBuilder::scene(&["0,0"]).file("main.js", b"code".as_slice()).build(&signer);
//!     let outcome = validate_local(&deployment, &StubExternalCalls::new()).await;
//!     assert!(outcome.is_ok());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod calls;
pub mod fixtures;
pub mod generators;
pub mod network;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::calls::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::network::*;
}

pub use calls::*;
pub use fixtures::*;
pub use generators::*;
pub use network::*;
