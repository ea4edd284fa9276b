//! Shared test utilities for the integration suites.
//!
//! This module provides:
//! - An in-memory recording DocumentStore mock
//! - Helpers for building active-task entries

pub mod mock_store;

pub use mock_store::*;
