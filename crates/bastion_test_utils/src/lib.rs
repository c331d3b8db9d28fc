//! # Bastion Test Utilities
//!
//! Shared testing infrastructure for the Bastion workspace.
//!
//! ## Modules
//!
//! - [`fixtures`] - Small rulesets, maps and pre-built clocks
//! - [`determinism`] - Harness for replaying command scripts and comparing hashes
//!
//! Proptest strategies for commands live in [`determinism::strategies`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

pub use proptest;
