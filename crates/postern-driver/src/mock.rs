//! Mock driver for tests.
//!
//! The console stream writes monotonically increasing line numbers, one per
//! write, until closed; the counter survives re-dials, so a later session
//! always starts past everything an earlier one saw. Control operations
//! record the most recent action in a process-global map keyed by the
//! `addr` field of the connection info, observable via
//! [`last_power_action`]. Valid boot devices are `A` and `B`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::coordinator::{Console, ConsoleBackend, Coordinator, Proc};
use crate::{Driver, DriverError, Obm};

/// The most recent control action per mock OBM, keyed by addr.
static LAST_POWER_ACTIONS: LazyLock<Mutex<HashMap<String, PowerAction>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A control action recorded by the mock driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Off,
    SoftReboot,
    ForceReboot,
    BootdevA,
    BootdevB,
}

/// The last control action performed on the mock OBM registered with `addr`,
/// if any. Test-observable.
pub fn last_power_action(addr: &str) -> Option<PowerAction> {
    LAST_POWER_ACTIONS
        .lock()
        .expect("power action map poisoned")
        .get(addr)
        .copied()
}

fn record_power_action(addr: &str, action: PowerAction) {
    LAST_POWER_ACTIONS
        .lock()
        .expect("power action map poisoned")
        .insert(addr.to_owned(), action);
}

/// Mock driver for use in tests.
pub struct MockDriver;

#[derive(Debug, Clone, Deserialize)]
struct MockInfo {
    addr: String,
}

impl Driver for MockDriver {
    fn get_obm(&self, info: &[u8]) -> Result<Arc<dyn Obm>, DriverError> {
        let info: MockInfo = serde_json::from_slice(info)?;
        let backend = Arc::new(MockBackend {
            writes: Arc::new(AtomicU64::new(0)),
        });
        Ok(Arc::new(MockObm {
            coordinator: Coordinator::new(backend),
            addr: info.addr,
        }))
    }
}

/// A mock console session: a background task writing line numbers into a
/// pipe until shut down.
struct MockProc {
    reader: Option<tokio::io::DuplexStream>,
    writer_task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl Proc for MockProc {
    fn take_reader(&mut self) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(self.reader.take().expect("reader already taken"))
    }

    async fn shutdown(self: Box<Self>) -> Result<(), DriverError> {
        self.writer_task.abort();
        let _ = self.writer_task.await;
        Ok(())
    }
}

struct MockBackend {
    /// Total writes across all sessions of this OBM.
    writes: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl ConsoleBackend for MockBackend {
    async fn dial(&self) -> Result<Box<dyn Proc>, DriverError> {
        let (theirs, mut ours) = tokio::io::duplex(256);
        let writes = self.writes.clone();
        let writer_task = tokio::spawn(async move {
            loop {
                let line = format!("{}\n", writes.fetch_add(1, Ordering::SeqCst));
                if ours.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::new(MockProc {
            reader: Some(theirs),
            writer_task,
        }))
    }
}

struct MockObm {
    coordinator: Coordinator,
    addr: String,
}

impl MockObm {
    /// Record a control action from inside the coordinator, so it is
    /// serialized with console dial/drop like a real control op would be.
    async fn record(&self, action: PowerAction) -> Result<(), DriverError> {
        let addr = self.addr.clone();
        self.coordinator
            .run(move || async move { record_power_action(&addr, action) })
            .await
    }
}

#[async_trait::async_trait]
impl Obm for MockObm {
    async fn serve(&self, cancel: watch::Receiver<bool>) {
        self.coordinator.serve(cancel).await;
    }

    async fn dial_console(&self) -> Result<Console, DriverError> {
        self.coordinator.dial_console().await
    }

    async fn drop_console(&self) -> Result<(), DriverError> {
        self.coordinator.drop_console().await
    }

    async fn power_off(&self) -> Result<(), DriverError> {
        self.record(PowerAction::Off).await
    }

    async fn power_cycle(&self, force: bool) -> Result<(), DriverError> {
        if force {
            self.record(PowerAction::ForceReboot).await
        } else {
            self.record(PowerAction::SoftReboot).await
        }
    }

    async fn set_bootdev(&self, dev: &str) -> Result<(), DriverError> {
        match dev {
            "A" => self.record(PowerAction::BootdevA).await,
            "B" => self.record(PowerAction::BootdevB).await,
            _ => Err(DriverError::InvalidBootdev(dev.to_owned())),
        }
    }

    async fn get_power_status(&self) -> Result<String, DriverError> {
        self.coordinator
            .run(|| async { "Mock Status".to_owned() })
            .await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    fn start_mock(addr: &str) -> (Arc<dyn Obm>, watch::Sender<bool>) {
        let info = format!("{{\"addr\": \"{addr}\"}}");
        let obm = MockDriver.get_obm(info.as_bytes()).unwrap();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let server = obm.clone();
        tokio::spawn(async move { server.serve(cancel_rx).await });
        (obm, cancel_tx)
    }

    /// Read one `\n`-terminated line number from the console.
    async fn read_line_number(console: &mut Console) -> u64 {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            console.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        String::from_utf8(line).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_console_counts_up_from_zero() {
        let (obm, _cancel) = start_mock("count-up");
        let mut console = obm.dial_console().await.unwrap();
        for expected in 0..5 {
            assert_eq!(read_line_number(&mut console).await, expected);
        }
    }

    #[tokio::test]
    async fn test_counter_survives_redial() {
        let (obm, _cancel) = start_mock("redial");
        let mut first = obm.dial_console().await.unwrap();
        let last_seen = {
            let mut n = 0;
            for _ in 0..3 {
                n = read_line_number(&mut first).await;
            }
            n
        };
        drop(first);

        let mut second = obm.dial_console().await.unwrap();
        let next = read_line_number(&mut second).await;
        assert!(
            next > last_seen,
            "new session started at {next}, but {last_seen} was already seen"
        );
    }

    #[tokio::test]
    async fn test_power_actions_recorded() {
        let (obm, _cancel) = start_mock("actions");

        obm.power_off().await.unwrap();
        assert_eq!(last_power_action("actions"), Some(PowerAction::Off));

        obm.power_cycle(true).await.unwrap();
        assert_eq!(last_power_action("actions"), Some(PowerAction::ForceReboot));

        obm.power_cycle(false).await.unwrap();
        assert_eq!(last_power_action("actions"), Some(PowerAction::SoftReboot));

        obm.set_bootdev("A").await.unwrap();
        assert_eq!(last_power_action("actions"), Some(PowerAction::BootdevA));

        obm.set_bootdev("B").await.unwrap();
        assert_eq!(last_power_action("actions"), Some(PowerAction::BootdevB));
    }

    #[tokio::test]
    async fn test_invalid_bootdev_leaves_actions_untouched() {
        let (obm, _cancel) = start_mock("bad-bootdev");
        obm.power_off().await.unwrap();

        assert!(matches!(
            obm.set_bootdev("disk").await,
            Err(DriverError::InvalidBootdev(_))
        ));
        assert_eq!(last_power_action("bad-bootdev"), Some(PowerAction::Off));
    }

    #[tokio::test]
    async fn test_power_status() {
        let (obm, _cancel) = start_mock("status");
        assert_eq!(obm.get_power_status().await.unwrap(), "Mock Status");
    }

    #[tokio::test]
    async fn test_cancel_stops_console() {
        let (obm, cancel) = start_mock("cancel");
        let mut console = obm.dial_console().await.unwrap();
        read_line_number(&mut console).await;

        cancel.send(true).unwrap();

        // The writer task is aborted during teardown; the stream drains to
        // EOF shortly after.
        let mut buf = [0u8; 64];
        loop {
            match console.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        assert!(matches!(
            obm.dial_console().await,
            Err(DriverError::Canceled)
        ));
    }
}
