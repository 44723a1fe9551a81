//! Test utilities and fixtures for tsjest
//!
//! This crate provides shared test helpers that can be used by
//! integration tests (tests/ directory) of the other crates.

pub mod compile;
pub mod fixtures;
pub mod mocks;
