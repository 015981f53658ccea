//! Dummy driver for experimentation without a real BMC.
//!
//! The "console" is a raw TCP connection to the `addr` in the connection
//! info; control operations log and succeed.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tracing::info;

use crate::coordinator::{Console, ConsoleBackend, Coordinator, Proc};
use crate::{Driver, DriverError, Obm};

/// Driver whose console is a plain TCP connection.
pub struct DummyDriver;

#[derive(Debug, Clone, Deserialize)]
struct DummyInfo {
    addr: String,
}

impl Driver for DummyDriver {
    fn get_obm(&self, info: &[u8]) -> Result<Arc<dyn Obm>, DriverError> {
        let info: DummyInfo = serde_json::from_slice(info)?;
        let backend = Arc::new(DummyBackend {
            addr: info.addr.clone(),
        });
        Ok(Arc::new(DummyObm {
            coordinator: Coordinator::new(backend),
            addr: info.addr,
        }))
    }
}

struct DummyProc {
    reader: Option<tokio::net::tcp::OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
}

#[async_trait::async_trait]
impl Proc for DummyProc {
    fn take_reader(&mut self) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(self.reader.take().expect("reader already taken"))
    }

    async fn shutdown(mut self: Box<Self>) -> Result<(), DriverError> {
        // Dropping the write half closes the connection.
        drop(self.writer.take());
        Ok(())
    }
}

struct DummyBackend {
    addr: String,
}

#[async_trait::async_trait]
impl ConsoleBackend for DummyBackend {
    async fn dial(&self) -> Result<Box<dyn Proc>, DriverError> {
        let conn = TcpStream::connect(&self.addr).await?;
        let (reader, writer) = conn.into_split();
        Ok(Box::new(DummyProc {
            reader: Some(reader),
            writer: Some(writer),
        }))
    }
}

struct DummyObm {
    coordinator: Coordinator,
    addr: String,
}

#[async_trait::async_trait]
impl Obm for DummyObm {
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
        let addr = self.addr.clone();
        self.coordinator
            .run(move || async move { info!(%addr, "dummy power off") })
            .await
    }

    async fn power_cycle(&self, force: bool) -> Result<(), DriverError> {
        let addr = self.addr.clone();
        self.coordinator
            .run(move || async move { info!(%addr, force, "dummy power cycle") })
            .await
    }

    async fn set_bootdev(&self, dev: &str) -> Result<(), DriverError> {
        let addr = self.addr.clone();
        let dev = dev.to_owned();
        self.coordinator
            .run(move || async move { info!(%addr, %dev, "dummy set bootdev") })
            .await
    }

    async fn get_power_status(&self) -> Result<String, DriverError> {
        let addr = self.addr.clone();
        self.coordinator
            .run(move || async move {
                info!(%addr, "dummy power status");
                "Dummy Status".to_owned()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_console_is_tcp_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"serial output").await.unwrap();
        });

        let info = format!("{{\"addr\": \"{addr}\"}}");
        let obm = DummyDriver.get_obm(info.as_bytes()).unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let server = obm.clone();
        tokio::spawn(async move { server.serve(cancel_rx).await });

        let mut console = obm.dial_console().await.unwrap();
        let mut buf = [0u8; 13];
        console.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"serial output");

        obm.power_off().await.unwrap();
        assert_eq!(obm.get_power_status().await.unwrap(), "Dummy Status");
    }

    #[tokio::test]
    async fn test_dial_fails_when_nothing_listens() {
        // Bind and immediately drop to get a port nobody is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let info = format!("{{\"addr\": \"{addr}\"}}");
        let obm = DummyDriver.get_obm(info.as_bytes()).unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let server = obm.clone();
        tokio::spawn(async move { server.serve(cancel_rx).await });

        assert!(obm.dial_console().await.is_err());
    }
}
