//! Command handlers.
//!
//! This module contains the operations exposed to callers (the CLI, or an
//! embedding UI or server): submission, status, inline splits and release.

pub mod split;

pub use split::*;
