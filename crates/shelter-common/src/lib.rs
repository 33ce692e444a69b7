//! Common utilities for shelter
//!
//! This crate provides the error type shared by the store and the CLI.

pub mod error;

pub use error::{Result, ShelterError};
