//! Foundational and often-reused types.

pub mod config;
pub mod error;
pub(crate) mod id;
pub(crate) mod peer;
