// crates/osiris-runtime/src/lib.rs
// ============================================================================
// Module: Osiris Runtime Library
// Description: Public API surface for session I/O and execution adapters.
// Purpose: Expose the session context, adapters, drivers, and protocol.
// Dependencies: crate::{drivers, local, proxy, session}
// ============================================================================

//! ## Overview
//! The runtime owns one run's I/O through the session context, executes
//! compiled manifests either in-process (local adapter) or through a
//! sandboxed proxy worker speaking newline-delimited JSON over stdio, and
//! maps component names to [`osiris_core::Driver`] implementations through
//! the driver registry. Both adapters produce byte-comparable run-log
//! layouts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod drivers;
pub mod local;
pub mod protocol;
pub mod proxy;
pub mod session;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use drivers::DriverRegistry;
pub use local::ExecutionError;
pub use local::ExecutionInput;
pub use local::ExecutionResult;
pub use local::LocalAdapter;
pub use protocol::HostCommand;
pub use protocol::WorkerMessage;
pub use proxy::ProcessSandbox;
pub use proxy::ProxyAdapter;
pub use proxy::ProxyError;
pub use proxy::Sandbox;
pub use session::SessionContext;
pub use session::SessionError;
