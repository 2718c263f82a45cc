//! # Catalyst Validation
//!
//! The rules a candidate deployment must pass before a node admits it.
//!
//! A [`Validator`] evaluates the rule set of the deployment's protocol
//! version, in order, against a [`ServerEnvironment`] (static limits, the
//! authenticator, access control, metadata schemas) and an
//! [`ExternalCalls`] implementation, the only side-effecting boundary.
//!
//! Invalid deployments are reported as a list of messages, never as an
//! error. `Err` is reserved for collaborator failures that prevent a
//! verdict.
//!
//! ## Example
//!
//! ```rust,ignore
//! use catalyst_validation::{DeploymentContext, ServerEnvironment, Validator};
//!
//! let validator = Validator::new(ServerEnvironment::default());
//! let outcome = validator
//!     .validate(&deployment, DeploymentContext::Local, &external_calls)
//!     .await?;
//! if !outcome.is_ok() {
//!     for error in outcome.errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod auth;
mod env;
mod error;
mod external;
pub mod rules;
pub mod schema;
mod validator;

pub use access::{AccessChecker, AccessRequest, AllowAllAccessChecker, ProfileOwnershipChecker};
pub use auth::{AuthError, ContentAuthenticator, DELEGATION_HEADER};
pub use env::{system_now, ServerEnvironment};
pub use error::{ExternalCallError, ValidationError, ValidationResult};
pub use external::ExternalCalls;
pub use rules::{
    rules_for, DeploymentContext, DeploymentToValidate, RuleKind, RuleResult, Validation,
    ValidationArgs,
};
pub use schema::{EntitySchema, SchemaRegistry};
pub use validator::{RuleFailure, ValidationOutcome, Validator};
