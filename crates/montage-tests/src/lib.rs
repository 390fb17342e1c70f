//! Integration test crate for Montage.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every library crate to verify they work together.

#[cfg(test)]
mod engine;

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod pipeline;
