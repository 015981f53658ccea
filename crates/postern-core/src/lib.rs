//! Node state and the daemon facade.
//!
//! [`State`] owns the set of registered nodes: an in-memory map of live
//! [`Node`]s (each with a running coordinator) mirrored to the SQL store.
//! [`Daemon`] is the serialized facade the external surface talks to — a
//! single process-wide lock gives a total order over registrations,
//! deletions, version bumps, and token operations, so no control operation
//! can race a token invalidation.

mod daemon;
mod error;
mod node;
mod state;


pub use daemon::Daemon;
pub use error::DaemonError;
pub use node::Node;
pub use state::State;
