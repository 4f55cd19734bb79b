//! Core traits for the Windows provider
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ScriptRunner`]: Run a PowerShell script over a transport
//! - [`Resource`] / [`DataSource`]: Map attribute state to host objects
//! - [`StateStore`]: Persist resource state between invocations

pub mod resource;
pub mod script_runner;
pub mod state_store;

pub use resource::{DataSource, Resource};
pub use script_runner::{RunnerFactory, Script, ScriptOutput, ScriptRunner};
pub use state_store::{StateRecord, StateStore};
