//! Integration tests for Stepwise
//!
//! These tests verify that the tracer, the transport and the run store work
//! together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod end_to_end;
pub mod transport_flow;
