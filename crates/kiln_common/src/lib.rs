//! Shared foundational types used across the Kiln bitcode compiler.
//!
//! This crate provides the content fingerprint type used by the compilation
//! cache to detect changed inputs.

#![warn(missing_docs)]

pub mod fingerprint;

pub use fingerprint::Fingerprint;
