//! Core domain models for the status engine
//!
//! This module defines the status taxonomy, the node runtime context and the
//! structured records (failure info, outcomes) that ride along with status
//! transitions.

pub mod context;
pub mod failure;
pub mod outcome;
pub mod status;

pub use context::*;
pub use failure::*;
pub use outcome::*;
pub use status::*;
