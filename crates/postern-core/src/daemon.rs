//! The serialized facade the external surface talks to.

use postern_driver::Console;
use postern_types::Token;
use tokio::sync::Mutex;

use crate::DaemonError;
use crate::state::State;

/// The daemon: every public operation acquires the single process-wide
/// lock, giving one total order over registrations, deletions, version
/// bumps, token operations, and token checks.
///
/// Console streaming is the one long-lived operation: it validates the
/// token and dials under the lock, then releases it before the stream is
/// consumed. A later invalidation still disconnects the reader, because it
/// tears down the coordinator's console session, which closes the stream.
pub struct Daemon {
    state: Mutex<State>,
}

impl Daemon {
    /// Wrap a loaded [`State`].
    pub fn new(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Cancel every node's coordinator and wait for them to drain. Called
    /// once at shutdown.
    pub async fn close(&self) {
        self.state.lock().await.close().await;
    }

    /// Register a node, or re-register an existing one.
    ///
    /// Re-registration is delete-then-create at version + 1: the old
    /// coordinator is torn down (invalidating outstanding tokens and
    /// consoles) and a fresh one is built from the new info. A brand-new
    /// node starts at version 1.
    pub async fn set_node(&self, label: &str, info: &[u8]) -> Result<(), DaemonError> {
        let mut state = self.state.lock().await;
        let version = match state.get_node(label) {
            Ok(node) => {
                let next = node.version() + 1;
                state.delete_node(label).await?;
                next
            }
            Err(_) => 1,
        };
        state.new_node(label, info, version)
    }

    /// Unregister a node, draining its coordinator.
    pub async fn delete_node(&self, label: &str) -> Result<(), DaemonError> {
        let mut state = self.state.lock().await;
        if !state.contains(label) {
            return Err(DaemonError::NoSuchNode);
        }
        state.delete_node(label).await
    }

    /// The node's current registration version.
    pub async fn get_node_version(&self, label: &str) -> Result<u64, DaemonError> {
        let state = self.state.lock().await;
        Ok(state.get_node(label)?.version())
    }

    /// Conditional version bump: succeeds iff `expected_next` is exactly
    /// one past the current version. On success the console is dropped and
    /// the token invalidated; on conflict the current version is returned
    /// inside the error.
    pub async fn set_node_version(
        &self,
        label: &str,
        expected_next: u64,
    ) -> Result<u64, DaemonError> {
        let mut state = self.state.lock().await;
        let current = state.get_node(label)?.version();
        if expected_next != current + 1 {
            return Err(DaemonError::VersionConflict { current });
        }
        let new_version = state.bump_version(label)?;
        state.get_node_mut(label)?.clear_token().await;
        Ok(new_version)
    }

    /// Mint a fresh token for the node, invalidating any previous one (and
    /// disconnecting its console). Fails with a version conflict if
    /// `expected_version` is not the node's current version. The token is
    /// returned exactly once.
    pub async fn mint_token(
        &self,
        label: &str,
        expected_version: u64,
    ) -> Result<(Token, u64), DaemonError> {
        let mut state = self.state.lock().await;
        let node = state.get_node_mut(label)?;
        let current = node.version();
        if expected_version != current {
            return Err(DaemonError::VersionConflict { current });
        }
        let token = node.new_token().await?;
        Ok((token, current))
    }

    /// Reset the node's token to the sentinel and drop its console.
    pub async fn invalidate_token(&self, label: &str) -> Result<(), DaemonError> {
        let mut state = self.state.lock().await;
        state.get_node_mut(label)?.clear_token().await;
        Ok(())
    }

    /// Validate the token and dial the node's console. The returned stream
    /// is consumed after the lock is released.
    pub async fn dial_console(&self, label: &str, token: &Token) -> Result<Console, DaemonError> {
        let state = self.state.lock().await;
        let node = state.get_node(label)?;
        if !node.valid_token(token) {
            return Err(DaemonError::InvalidToken);
        }
        Ok(node.obm().dial_console().await?)
    }

    /// Power the node off.
    pub async fn power_off(&self, label: &str, token: &Token) -> Result<(), DaemonError> {
        let state = self.state.lock().await;
        let node = state.get_node(label)?;
        if !node.valid_token(token) {
            return Err(DaemonError::InvalidToken);
        }
        Ok(node.obm().power_off().await?)
    }

    /// Reboot the node; `force` requests a hard reset.
    pub async fn power_cycle(
        &self,
        label: &str,
        force: bool,
        token: &Token,
    ) -> Result<(), DaemonError> {
        let state = self.state.lock().await;
        let node = state.get_node(label)?;
        if !node.valid_token(token) {
            return Err(DaemonError::InvalidToken);
        }
        Ok(node.obm().power_cycle(force).await?)
    }

    /// Set the node's next boot device.
    pub async fn set_bootdev(
        &self,
        label: &str,
        dev: &str,
        token: &Token,
    ) -> Result<(), DaemonError> {
        let state = self.state.lock().await;
        let node = state.get_node(label)?;
        if !node.valid_token(token) {
            return Err(DaemonError::InvalidToken);
        }
        Ok(node.obm().set_bootdev(dev).await?)
    }

    /// The node's power status, as reported by the driver.
    pub async fn get_power_status(
        &self,
        label: &str,
        token: &Token,
    ) -> Result<String, DaemonError> {
        let state = self.state.lock().await;
        let node = state.get_node(label)?;
        if !node.valid_token(token) {
            return Err(DaemonError::InvalidToken);
        }
        Ok(node.obm().get_power_status().await?)
    }
}
