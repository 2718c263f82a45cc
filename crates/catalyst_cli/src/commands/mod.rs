//! CLI command implementations.

pub mod hash;
pub mod validate;
pub mod watermarks;
