//! Common utilities shared across Gatehouse crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, header inspection, time checks)
pub mod jwt;
