//! A registered node and its live OBM.

use std::sync::{Arc, LazyLock};

use postern_driver::{Driver, Obm};
use postern_types::Token;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::DaemonError;

/// The placeholder used when a node has no valid token: a random value
/// generated once per process and never emitted, so the comparison logic
/// never needs a special "no token" case — the sentinel simply matches
/// nobody.
static NO_TOKEN: LazyLock<Token> = LazyLock::new(Token::random);

/// A registered node: its persisted connection info, registration version,
/// current bearer token, and the live OBM with its coordinator task.
///
/// All mutation happens under the daemon's lock; nothing here synchronizes
/// on its own.
pub struct Node {
    conn_info: Vec<u8>,
    version: u64,
    current_token: Token,
    obm: Arc<dyn Obm>,
    cancel: Option<watch::Sender<bool>>,
    serve_task: Option<JoinHandle<()>>,
}

impl Node {
    /// Construct a node with the given driver info and version, and no
    /// valid token. Fails if the driver rejects the info; nothing has been
    /// spawned or persisted at that point.
    pub fn new(driver: &dyn Driver, conn_info: Vec<u8>, version: u64) -> Result<Self, DaemonError> {
        let obm = driver.get_obm(&conn_info)?;
        Ok(Self {
            conn_info,
            version,
            current_token: *NO_TOKEN,
            obm,
            cancel: None,
            serve_task: None,
        })
    }

    /// Spawn the OBM's coordinator task.
    pub fn start_obm(&mut self) {
        assert!(self.cancel.is_none(), "OBM is already started");
        let (cancel, cancel_rx) = watch::channel(false);
        let obm = self.obm.clone();
        self.serve_task = Some(tokio::spawn(async move { obm.serve(cancel_rx).await }));
        self.cancel = Some(cancel);
    }

    /// Cancel the coordinator and wait for it to drain. The teardown of any
    /// active console happens inside the coordinator before it exits.
    pub async fn stop_obm(&mut self) {
        let cancel = self.cancel.take().expect("OBM is not running");
        let _ = cancel.send(true);
        if let Some(task) = self.serve_task.take() {
            let _ = task.await;
        }
    }

    /// Generate a new token, invalidating the old one (and disconnecting
    /// any console client using it).
    pub async fn new_token(&mut self) -> Result<Token, DaemonError> {
        let token = Token::random();
        self.clear_token().await;
        self.current_token = token;
        Ok(token)
    }

    /// Whether `token` is the node's current token. Constant-time.
    pub fn valid_token(&self, token: &Token) -> bool {
        self.current_token.ct_eq(token)
    }

    /// Reset the token to the sentinel and drop any active console.
    pub async fn clear_token(&mut self) {
        if let Err(e) = self.obm.drop_console().await {
            // Dropping an idle console never fails; this is the coordinator
            // already being cancelled, which achieves the same thing.
            debug!(%e, "drop console while clearing token");
        }
        self.current_token = *NO_TOKEN;
    }

    /// The node's registration version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// The persisted ConnInfo envelope bytes.
    pub fn conn_info(&self) -> &[u8] {
        &self.conn_info
    }

    /// The live OBM.
    pub fn obm(&self) -> &Arc<dyn Obm> {
        &self.obm
    }
}
