//! Internal modules for the school attendance client.
//!
//! This library provides the HTTP backend and the command parser used by the
//! sa_client binary.

pub mod commands;
pub mod http;
