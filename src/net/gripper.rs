//! The actuator channel: gripper control over the dashboard socket.
//!
//! The gripper is driven by loading and playing named device programs on
//! the controller's dashboard server, which is addressed separately from
//! the motion link. Every command opens its own connection, consumes the
//! welcome banner, does one request/response round trip and closes, so
//! the motion driver's link is never starved.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::core::errors::ActuatorError;

static LOG_TARGET: &'static str = "gripper_channel";

#[derive(Debug, Clone)]
pub struct GripperConfig {
    /// host:port of the dashboard server, distinct from the motion link.
    pub address: String,
    pub open_program: String,
    pub close_program: String,
    /// Bound on each connect/request/response round trip.
    pub response_timeout: Duration,
    /// Completion-poll interval.
    pub poll_interval: Duration,
    /// Pause between loading a program and playing it; the controller
    /// needs a moment before `play` targets the newly loaded program.
    pub load_play_delay: Duration,
}

impl Default for GripperConfig {
    fn default() -> Self {
        GripperConfig {
            address: "192.168.1.10:29999".to_string(),
            open_program: "open-gripper.urp".to_string(),
            close_program: "close-gripper.urp".to_string(),
            response_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(300),
            load_play_delay: Duration::from_secs(1),
        }
    }
}

pub struct GripperChannel {
    config: GripperConfig,
}

impl GripperChannel {
    pub fn new(config: GripperConfig) -> Self {
        GripperChannel { config }
    }

    /// Probe reachability: connect, read the banner, close. No socket is
    /// held afterwards.
    pub async fn connect(&self) -> Result<(), ActuatorError> {
        let banner = self.round_trip(None).await?;
        log::info!(target: LOG_TARGET, "Dashboard says: {}", banner);
        Ok(())
    }

    pub async fn open_gripper(&self) -> Result<(), ActuatorError> {
        self.run_program(&self.config.open_program).await
    }

    pub async fn close_gripper(&self) -> Result<(), ActuatorError> {
        self.run_program(&self.config.close_program).await
    }

    /// Two-phase invoke: load the named program, then trigger it.
    async fn run_program(&self, program: &str) -> Result<(), ActuatorError> {
        log::info!(target: LOG_TARGET, "Loading program: {}", program);
        let ack = self.send_command(&format!("load {program}")).await?;
        if is_rejection(&ack) {
            return Err(ActuatorError::Rejected(ack));
        }

        sleep(self.config.load_play_delay).await;

        log::info!(target: LOG_TARGET, "Playing program: {}", program);
        let ack = self.send_command("play").await?;
        if is_rejection(&ack) {
            return Err(ActuatorError::Rejected(ack));
        }
        Ok(())
    }

    /// Poll the remote program state until it reports a terminal state or
    /// the timeout elapses. Timeout is a normal outcome (false), not an
    /// error; the caller treats it as "proceed cautiously".
    pub async fn wait_for_completion(&self, wait_timeout: Duration) -> bool {
        let deadline = Instant::now() + wait_timeout;
        loop {
            match self.send_command("programState").await {
                Ok(state) if state.starts_with("STOPPED") || state.starts_with("PAUSED") => {
                    return true;
                }
                Ok(state) => {
                    log::debug!(target: LOG_TARGET, "Program state: {}", state);
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET,
                        "Completion poll failed: {}. Proceeding without confirmation.", e);
                    return false;
                }
            }
            if Instant::now() >= deadline {
                log::warn!(target: LOG_TARGET,
                    "Gripper did not reach a terminal state within {:?}", wait_timeout);
                return false;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// One command, one acknowledgement line.
    async fn send_command(&self, command: &str) -> Result<String, ActuatorError> {
        self.round_trip(Some(command)).await
    }

    /// Open a fresh connection, consume the banner, optionally send one
    /// command and read its acknowledgement, close. Returns the banner
    /// when no command is given.
    async fn round_trip(&self, command: Option<&str>) -> Result<String, ActuatorError> {
        let exchange = async {
            let stream = TcpStream::connect(&self.config.address)
                .await
                .map_err(|e| ActuatorError::ConnectionRefused(e.to_string()))?;
            let mut stream = BufReader::new(stream);

            let mut banner = String::new();
            let n = stream
                .read_line(&mut banner)
                .await
                .map_err(|e| ActuatorError::Protocol(e.to_string()))?;
            if n == 0 {
                return Err(ActuatorError::Protocol(
                    "connection closed before welcome line".to_string(),
                ));
            }

            let Some(command) = command else {
                return Ok(banner.trim().to_string());
            };

            stream
                .write_all(format!("{command}\n").as_bytes())
                .await
                .map_err(|e| ActuatorError::Protocol(e.to_string()))?;
            stream
                .flush()
                .await
                .map_err(|e| ActuatorError::Protocol(e.to_string()))?;

            let mut ack = String::new();
            let n = stream
                .read_line(&mut ack)
                .await
                .map_err(|e| ActuatorError::Protocol(e.to_string()))?;
            if n == 0 {
                return Err(ActuatorError::Protocol(
                    "connection closed before acknowledgement".to_string(),
                ));
            }
            let ack = ack.trim().to_string();
            if ack.is_empty() {
                return Err(ActuatorError::Protocol("empty acknowledgement".to_string()));
            }
            Ok(ack)
        };

        match timeout(self.config.response_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorError::Timeout(self.config.response_timeout)),
        }
    }
}

/// The dashboard reports failures as text in the acknowledgement.
fn is_rejection(ack: &str) -> bool {
    ack.contains("Error") || ack.contains("File not found")
}
