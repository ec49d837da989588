//! Shared types for the marketplace services
//!
//! Domain models, the unified error system and webhook wire types used by
//! the reconciliation service and its tests.

pub mod error;
pub mod models;
pub mod webhook;
