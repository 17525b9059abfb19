//! nl2sql CLI library.
//!
//! This module exposes internal types for testing purposes.
//! The main entry point is the `nl2sql` binary.

pub mod cli;
pub mod input;
pub mod output;

pub use cli::Args;
