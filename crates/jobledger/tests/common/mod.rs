//! Shared test utilities for jobledger integration tests.
//!
//! - `TestHarness`: a file-backed ledger in a temp directory
//! - fake renderer and actuator with call counters

pub mod fakes;
pub mod harness;

pub use fakes::{FakeRenderer, ScriptedActuator};
pub use harness::TestHarness;
