//! Synchronous line transport over stdio.
//!
//! The client talks to its parent controller in single-line messages:
//! requests go out as `"/<cmd>:<base64(frame)>\r\n"` on stdout and the
//! matching reply arrives as `"/resp:<cmd>:<base64(frame)>\r\n"` on stdin.
//! Exactly one request is outstanding at a time; the only suspension point
//! is the bounded wait for the reply line.
//!
//! Stdin is drained by a dedicated reader task that forwards complete lines
//! through a channel, so a timed-out wait never tears a line apart — the
//! next receive simply observes a stale reply and fails its own exchange.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;
use tether_proto::Status;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Bounded wait for a controller reply.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Maximum accepted line length; longer lines are a protocol error.
pub const MAX_LINE_BYTES: usize = 65_535;

/// Operation name carried in the line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read resource values.
    Read,
    /// Write resource values.
    Write,
    /// Execute a resource.
    Execute,
    /// Discover resources.
    Discover,
    /// Create an instance.
    Create,
    /// Delete an instance.
    Delete,
}

impl Command {
    /// The command string used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Discover => "discover",
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport failures, each mapping to a CoAP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No reply line arrived within [`RESPONSE_TIMEOUT`].
    #[error("no reply from controller within 1.5s")]
    Timeout,

    /// Stdin reached end of file; the controller is gone.
    #[error("controller closed stdin")]
    Closed,

    /// The reply line did not start with `"/resp:<cmd>:"` for the command
    /// just sent.
    #[error("reply prefix does not match command {command:?}")]
    PrefixMismatch {
        /// Command string the prefix was checked against.
        command: String,
    },

    /// The reply decoded to zero bytes.
    #[error("reply carried an empty payload")]
    EmptyPayload,

    /// The reply payload was not valid base64.
    #[error("reply payload is not base64: {0}")]
    Base64(String),

    /// A line met or exceeded [`MAX_LINE_BYTES`].
    #[error("line of {0} bytes exceeds the 65535-byte limit")]
    Oversize(usize),

    /// Writing the request line failed.
    #[error("stdout write failed: {0}")]
    Io(String),
}

impl ChannelError {
    /// CoAP status equivalent of this failure, before any caller-facing
    /// remap. Timeouts are 5.01; everything else is a protocol error.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Timeout => Status::NOT_IMPLEMENTED,
            _ => Status::INTERNAL_SERVER_ERROR,
        }
    }
}

/// One line received from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// A complete line, delimiter stripped.
    Line(String),
    /// A line that met or exceeded [`MAX_LINE_BYTES`] and was discarded.
    Oversize(usize),
}

/// The request/response seam the object proxy talks through.
///
/// `StdioChannel` is the production implementation; tests substitute a
/// scripted link.
#[async_trait(?Send)]
pub trait ControllerLink {
    /// Send one request frame and wait for its reply frame.
    async fn exchange(&mut self, command: Command, frame: &[u8]) -> Result<Vec<u8>, ChannelError>;
}

/// Line-oriented stdio transport shared by the proxy and the host driver.
pub struct StdioChannel<W> {
    lines: mpsc::Receiver<InboundLine>,
    out: W,
}

impl StdioChannel<tokio::io::Stdout> {
    /// Channel over the process's real stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self { lines: spawn_line_reader(tokio::io::stdin()), out: tokio::io::stdout() }
    }
}

impl<W: AsyncWrite + Unpin> StdioChannel<W> {
    /// Assemble a channel from an inbound line queue and an output sink.
    #[must_use]
    pub fn from_parts(lines: mpsc::Receiver<InboundLine>, out: W) -> Self {
        Self { lines, out }
    }

    /// Perform one request/response exchange for `command`.
    ///
    /// # Errors
    ///
    /// `ChannelError` on timeout, closed stdin, oversize or malformed reply
    /// lines. The decoded reply bytes are owned by the caller and dropped
    /// with it.
    pub async fn exchange(
        &mut self,
        command: Command,
        frame: &[u8],
    ) -> Result<Vec<u8>, ChannelError> {
        let payload = BASE64.encode(frame);
        self.send_line(&format!("/{command}:{payload}")).await?;

        let line = match timeout(RESPONSE_TIMEOUT, self.lines.recv()).await {
            Err(_) => return Err(ChannelError::Timeout),
            Ok(None) => return Err(ChannelError::Closed),
            Ok(Some(InboundLine::Oversize(len))) => return Err(ChannelError::Oversize(len)),
            Ok(Some(InboundLine::Line(line))) => line,
        };

        let reply = decode_reply(&line, command.as_str())?;
        tracing::debug!(%command, reply_len = reply.len(), "controller replied");
        Ok(reply)
    }

    /// Emit a `"/stateChanged:<base64(name)>"` notification line.
    ///
    /// # Errors
    ///
    /// `ChannelError::Io` if stdout rejects the write.
    pub async fn notify_state(&mut self, state_name: &str) -> Result<(), ChannelError> {
        let payload = BASE64.encode(state_name.as_bytes());
        self.send_line(&format!("/stateChanged:{payload}")).await
    }

    /// Emit the `"/observe:"` poll asking the controller for changed values.
    ///
    /// # Errors
    ///
    /// `ChannelError::Io` if stdout rejects the write.
    pub async fn poll_observed(&mut self) -> Result<(), ChannelError> {
        self.send_line("/observe:").await
    }

    /// Next inbound line outside of an exchange (observe replies and other
    /// controller-initiated traffic). `None` once stdin closes.
    pub async fn next_line(&mut self) -> Option<InboundLine> {
        self.lines.recv().await
    }

    async fn send_line(&mut self, line: &str) -> Result<(), ChannelError> {
        let io_err = |e: std::io::Error| ChannelError::Io(e.to_string());
        self.out.write_all(line.as_bytes()).await.map_err(io_err)?;
        self.out.write_all(b"\r\n").await.map_err(io_err)?;
        self.out.flush().await.map_err(io_err)
    }
}

#[async_trait(?Send)]
impl<W: AsyncWrite + Unpin> ControllerLink for StdioChannel<W> {
    async fn exchange(&mut self, command: Command, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        StdioChannel::exchange(self, command, frame).await
    }
}

/// Extract and decode the payload of a `"/resp:<cmd>:<base64>"` line.
///
/// # Errors
///
/// `ChannelError` if the prefix does not match `command`, the payload is not
/// base64, or it decodes to zero bytes.
pub fn decode_reply(line: &str, command: &str) -> Result<Vec<u8>, ChannelError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line
        .strip_prefix("/resp:")
        .and_then(|rest| rest.strip_prefix(command))
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| ChannelError::PrefixMismatch { command: command.to_owned() })?;
    let decoded = BASE64.decode(payload).map_err(|e| ChannelError::Base64(e.to_string()))?;
    if decoded.is_empty() {
        return Err(ChannelError::EmptyPayload);
    }
    Ok(decoded)
}

/// Spawn the stdin reader task and return its line queue.
///
/// The task enforces [`MAX_LINE_BYTES`]: an over-long line is discarded up
/// to its newline and reported as [`InboundLine::Oversize`]. The task ends
/// when the input does.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<InboundLine>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let read = (&mut reader).take(MAX_LINE_BYTES as u64).read_until(b'\n', &mut buf).await;
            let complete = match read {
                Ok(0) => break,
                Ok(_) => buf.ends_with(b"\n"),
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                },
            };

            let message = if buf.len() < MAX_LINE_BYTES {
                let text = String::from_utf8_lossy(&buf);
                InboundLine::Line(text.trim_end_matches(['\r', '\n']).to_owned())
            } else {
                // Hit the cap: discard up to the line's newline.
                let mut dropped = buf.len();
                while !complete {
                    buf.clear();
                    match (&mut reader)
                        .take(MAX_LINE_BYTES as u64)
                        .read_until(b'\n', &mut buf)
                        .await
                    {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            dropped += n;
                            if buf.ends_with(b"\n") {
                                break;
                            }
                        },
                    }
                }
                InboundLine::Oversize(dropped)
            };

            if tx.send(message).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_strings() {
        assert_eq!(Command::Read.as_str(), "read");
        assert_eq!(Command::Delete.to_string(), "delete");
    }

    #[test]
    fn decode_reply_accepts_matching_prefix() {
        let payload = decode_reply("/resp:read:AQI=\r\n", "read").expect("should decode");
        assert_eq!(payload, [0x01, 0x02]);
    }

    #[test]
    fn decode_reply_rejects_other_command() {
        let err = decode_reply("/resp:write:AAA=\r\n", "read").expect_err("should reject");
        assert!(matches!(err, ChannelError::PrefixMismatch { .. }));
    }

    #[test]
    fn decode_reply_rejects_empty_payload() {
        let err = decode_reply("/resp:read:", "read").expect_err("should reject");
        assert_eq!(err, ChannelError::EmptyPayload);
    }

    #[test]
    fn decode_reply_rejects_bad_base64() {
        let err = decode_reply("/resp:read:!!!", "read").expect_err("should reject");
        assert!(matches!(err, ChannelError::Base64(_)));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(ChannelError::Timeout.status(), Status::NOT_IMPLEMENTED);
        assert_eq!(
            ChannelError::PrefixMismatch { command: "read".into() }.status(),
            Status::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ChannelError::Oversize(70_000).status(), Status::INTERNAL_SERVER_ERROR);
    }
}
