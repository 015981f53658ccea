//! The node registry: in-memory map mirrored to the SQL store.

use std::collections::HashMap;
use std::sync::Arc;

use postern_driver::Driver;
use postern_store::NodeStore;
use tracing::info;

use crate::DaemonError;
use crate::node::Node;

/// The set of registered nodes.
///
/// Invariants (maintained by the methods below, which the daemon calls
/// under its lock — nothing here synchronizes on its own):
///
/// - every in-memory node has a row in the store, and vice versa;
/// - every in-memory node has a running coordinator;
/// - the in-memory version equals the committed row version.
pub struct State {
    nodes: HashMap<String, Node>,
    store: Arc<NodeStore>,
    registry: Arc<dyn Driver>,
}

impl State {
    /// Load every persisted registration, constructing each node's OBM and
    /// starting its coordinator. Must be called from within a runtime: the
    /// coordinators are spawned tasks.
    pub fn new(store: Arc<NodeStore>, registry: Arc<dyn Driver>) -> Result<Self, DaemonError> {
        let mut nodes = HashMap::new();
        for row in store.load_all()? {
            let mut node = Node::new(registry.as_ref(), row.obm_info, row.version)?;
            node.start_obm();
            info!(label = %row.label, version = row.version, "loaded node");
            nodes.insert(row.label, node);
        }
        Ok(Self {
            nodes,
            store,
            registry,
        })
    }

    /// Cancel every coordinator and wait for each to drain.
    pub async fn close(&mut self) {
        for (label, node) in self.nodes.iter_mut() {
            info!(%label, "stopping node");
            node.stop_obm().await;
        }
        self.nodes.clear();
    }

    /// Look up a node by label.
    pub fn get_node(&self, label: &str) -> Result<&Node, DaemonError> {
        self.nodes.get(label).ok_or(DaemonError::NoSuchNode)
    }

    /// Look up a node by label, mutably.
    pub fn get_node_mut(&mut self, label: &str) -> Result<&mut Node, DaemonError> {
        self.nodes.get_mut(label).ok_or(DaemonError::NoSuchNode)
    }

    /// Whether a node is registered under `label`.
    pub fn contains(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    /// Register a new node at the given version. Driver construction comes
    /// first, so a parse failure leaves neither memory nor store touched;
    /// the coordinator starts only after the row is committed.
    pub fn new_node(&mut self, label: &str, info: &[u8], version: u64) -> Result<(), DaemonError> {
        if self.nodes.contains_key(label) {
            return Err(DaemonError::NodeExists(label.to_owned()));
        }
        let mut node = Node::new(self.registry.as_ref(), info.to_vec(), version)?;
        self.store.insert(label, info, version)?;
        node.start_obm();
        self.nodes.insert(label.to_owned(), node);
        info!(%label, version, "registered node");
        Ok(())
    }

    /// Increment the node's version in memory and in the store. On a store
    /// failure the in-memory counter is rolled back, preserving the
    /// version-mirror invariant.
    pub fn bump_version(&mut self, label: &str) -> Result<u64, DaemonError> {
        let node = self.get_node_mut(label)?;
        let next = node.version() + 1;
        node.set_version(next);
        if let Err(e) = self.store.set_version(label, next) {
            self.get_node_mut(label)?.set_version(next - 1);
            return Err(e.into());
        }
        Ok(next)
    }

    /// Remove a node: cancel its coordinator (draining any console), drop
    /// it from the map, delete its row. Safe if already absent.
    pub async fn delete_node(&mut self, label: &str) -> Result<(), DaemonError> {
        if let Some(mut node) = self.nodes.remove(label) {
            node.stop_obm().await;
            info!(%label, "deleted node");
        }
        self.store.delete(label)?;
        Ok(())
    }
}
