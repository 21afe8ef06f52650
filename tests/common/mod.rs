//! Shared test utilities for Stepwise
//!
//! Fixture source trees, a scripted runtime layout and canned run payloads.

pub mod fixtures;
