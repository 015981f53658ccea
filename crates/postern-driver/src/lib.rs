//! OBM drivers for Postern.
//!
//! This crate defines the driver interface ([`Driver`], [`Obm`]), the
//! [`Registry`] that dispatches a ConnInfo envelope to a concrete driver,
//! and the per-node [`Coordinator`] that serializes every console and
//! control-plane operation for one OBM. Three drivers are included:
//!
//! - [`IpmiDriver`] — the real thing, shelling out to `ipmitool` with the
//!   serial console attached to a pty.
//! - [`MockDriver`] — deterministic in-process OBM for tests; the console
//!   emits incrementing line numbers and control ops are recorded in a
//!   test-observable map.
//! - [`DummyDriver`] — console is a raw TCP connection, control ops just
//!   log; useful for experimentation without a BMC.

mod coordinator;
mod dummy;
mod error;
mod ipmi;
mod mock;
mod registry;

pub use coordinator::{Console, ConsoleBackend, Coordinator, Proc};
pub use dummy::DummyDriver;
pub use error::DriverError;
pub use ipmi::IpmiDriver;
pub use mock::{MockDriver, PowerAction, last_power_action};
pub use registry::Registry;

use std::sync::Arc;

use tokio::sync::watch;

/// An out-of-band management endpoint for one node.
///
/// A task executing [`serve`](Obm::serve) must be running for any other
/// method to make progress: every operation is forwarded into the serve
/// loop and executed there, one at a time.
#[async_trait::async_trait]
pub trait Obm: Send + Sync {
    /// Run the coordinator loop until `cancel` flips to `true` (or its
    /// sender is dropped). After cancellation, pending and future
    /// operations fail with [`DriverError::Canceled`].
    async fn serve(&self, cancel: watch::Receiver<bool>);

    /// Connect to the console, tearing down any existing session first.
    async fn dial_console(&self) -> Result<Console, DriverError>;

    /// Disconnect the current console session, if any. Idempotent.
    async fn drop_console(&self) -> Result<(), DriverError>;

    /// Power off the node.
    async fn power_off(&self) -> Result<(), DriverError>;

    /// Reboot the node. `force` requests a hard reset rather than a soft
    /// shutdown that gives the node's operating system a chance to respond.
    async fn power_cycle(&self, force: bool) -> Result<(), DriverError>;

    /// Set the next boot device. Valid devices are driver-dependent.
    async fn set_bootdev(&self, dev: &str) -> Result<(), DriverError>;

    /// Get the node's power status.
    async fn get_power_status(&self) -> Result<String, DriverError>;
}

/// A driver for one type of OBM: a factory from connection info to a
/// ready-to-serve [`Obm`].
pub trait Driver: Send + Sync {
    /// Construct an OBM from driver-specific connection info. Parsing
    /// failures surface here, before anything is persisted or spawned.
    fn get_obm(&self, info: &[u8]) -> Result<Arc<dyn Obm>, DriverError>;
}
