//! OBM driver for IPMI controllers, on top of `ipmitool`.
//!
//! The console is `ipmitool ... sol activate` attached to a pty; the pty
//! master's read side is what consumers stream. Control operations are
//! one-shot `ipmitool chassis ...` invocations, each executed inside the
//! coordinator so they serialize with console dial/drop for the same node.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::warn;

use crate::coordinator::{Console, ConsoleBackend, Coordinator, Proc};
use crate::{Driver, DriverError, Obm};

/// How long to wait for `sol activate` to exit after the escape sequence
/// before sending SIGTERM, and again after SIGTERM before SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Boot devices `ipmitool chassis bootdev` accepts from us.
const VALID_BOOTDEVS: [&str; 3] = ["disk", "pxe", "none"];

/// Driver for IPMI controllers.
pub struct IpmiDriver;

/// Connection info for an IPMI controller.
#[derive(Clone, Deserialize)]
struct IpmiInfo {
    addr: String,
    user: String,
    pass: String,
}

// The password must never reach logs, not even via Debug formatting.
impl fmt::Debug for IpmiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpmiInfo")
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

impl Driver for IpmiDriver {
    fn get_obm(&self, info: &[u8]) -> Result<Arc<dyn Obm>, DriverError> {
        let info: Arc<IpmiInfo> = Arc::new(serde_json::from_slice(info)?);
        Ok(Arc::new(IpmiObm {
            coordinator: Coordinator::new(Arc::new(IpmiBackend { info: info.clone() })),
            info,
        }))
    }
}

/// Build an `ipmitool` invocation carrying the controller's connection
/// parameters, plus `args`.
fn ipmitool_command(info: &IpmiInfo, args: &[&str]) -> Command {
    let mut cmd = Command::new("ipmitool");
    cmd.args([
        "-I",
        "lanplus",
        "-U",
        info.user.as_str(),
        "-P",
        info.pass.as_str(),
        "-H",
        info.addr.as_str(),
    ]);
    cmd.args(args);
    cmd
}

/// Invoke `ipmitool`, returning its stdout on success.
async fn run_ipmitool(info: &IpmiInfo, args: &[&str]) -> Result<String, DriverError> {
    let output = ipmitool_command(info, args)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(DriverError::CommandFailed(format!(
            "ipmitool {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// A running `sol activate` process and its pty.
struct IpmiProc {
    child: Child,
    /// Read side of the pty master; taken by the coordinator after dial.
    reader: Option<tokio::fs::File>,
    /// Write side of the pty master, kept to deliver the escape sequence.
    writer: Option<tokio::fs::File>,
    info: Arc<IpmiInfo>,
}

#[async_trait::async_trait]
impl Proc for IpmiProc {
    fn take_reader(&mut self) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(self.reader.take().expect("pty reader already taken"))
    }

    async fn shutdown(mut self: Box<Self>) -> Result<(), DriverError> {
        // Ask the SOL session to end: newline + "~." is ipmitool's escape
        // sequence. Closing the write side afterwards unblocks the tool if
        // it is waiting on terminal input.
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.write_all(b"\r~.").await;
            let _ = writer.flush().await;
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
            .await
            .is_err()
        {
            if let Some(pid) = self.child.id() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
                .await
                .is_err()
            {
                warn!(addr = %self.info.addr, "sol activate ignored SIGTERM, killing");
                let _ = self.child.kill().await;
            }
        }

        // Clean up the controller-side SOL state so the next activation
        // doesn't find the slot busy.
        run_ipmitool(&self.info, &["sol", "deactivate"])
            .await
            .map(|_| ())
    }
}

struct IpmiBackend {
    info: Arc<IpmiInfo>,
}

#[async_trait::async_trait]
impl ConsoleBackend for IpmiBackend {
    async fn dial(&self) -> Result<Box<dyn Proc>, DriverError> {
        let pty = nix::pty::openpty(None, None).map_err(std::io::Error::from)?;
        let master = std::fs::File::from(pty.master);
        let reader = tokio::fs::File::from_std(master.try_clone()?);
        let writer = tokio::fs::File::from_std(master);

        let child = ipmitool_command(&self.info, &["sol", "activate"])
            .stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .stderr(Stdio::from(pty.slave))
            .kill_on_drop(true)
            .spawn()?;

        Ok(Box::new(IpmiProc {
            child,
            reader: Some(reader),
            writer: Some(writer),
            info: self.info.clone(),
        }))
    }
}

/// The OBM for one IPMI controller.
struct IpmiObm {
    coordinator: Coordinator,
    info: Arc<IpmiInfo>,
}

#[async_trait::async_trait]
impl Obm for IpmiObm {
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
        let info = self.info.clone();
        self.coordinator
            .run(move || async move {
                run_ipmitool(&info, &["chassis", "power", "off"])
                    .await
                    .map(|_| ())
            })
            .await?
    }

    async fn power_cycle(&self, force: bool) -> Result<(), DriverError> {
        let info = self.info.clone();
        let op = if force { "reset" } else { "cycle" };
        self.coordinator
            .run(move || async move {
                if run_ipmitool(&info, &["chassis", "power", op]).await.is_ok() {
                    return Ok(());
                }
                // Cycling fails when the machine is already powered off; in
                // that case just turn it on.
                run_ipmitool(&info, &["chassis", "power", "on"])
                    .await
                    .map(|_| ())
            })
            .await?
    }

    async fn set_bootdev(&self, dev: &str) -> Result<(), DriverError> {
        if !VALID_BOOTDEVS.contains(&dev) {
            return Err(DriverError::InvalidBootdev(dev.to_owned()));
        }
        let info = self.info.clone();
        let dev = dev.to_owned();
        self.coordinator
            .run(move || async move {
                run_ipmitool(
                    &info,
                    &["chassis", "bootdev", dev.as_str(), "options=persistent"],
                )
                .await
                .map(|_| ())
            })
            .await?
    }

    async fn get_power_status(&self) -> Result<String, DriverError> {
        let info = self.info.clone();
        self.coordinator
            .run(move || async move { run_ipmitool(&info, &["chassis", "power", "status"]).await })
            .await?
    }
}
