//! Host-services client: the connection factory, one-shot host commands,
//! the live device-tracking stream, and handoff into the sync, shell and
//! framebuffer protocols.

use crate::device::DeviceRecord;
use crate::error::{AdbError, Result};
use crate::framebuffer;
use crate::shell;
use crate::sync::SyncClient;
use crate::wire;
use image::RgbaImage;
use log::*;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5037;

/// Client for the `adb` host server.
///
/// Holds only the server address; every operation dials a fresh connection,
/// so one client can serve any number of calls. Connections handed off to a
/// [`SyncClient`] or a tracking stream belong exclusively to that value.
#[derive(Debug, Clone)]
pub struct HostClient {
    host: String,
    port: u16,
}

impl Default for HostClient {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl HostClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    async fn open(&self) -> Result<HostConnection<TcpStream>> {
        debug!("connecting to adb host server at {}:{}", self.host, self.port);
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        Ok(HostConnection::new(stream))
    }

    /// Ask the server for its internal version number.
    pub async fn version(&self) -> Result<u32> {
        self.open().await?.version().await
    }

    /// Snapshot of every device the server knows about.
    pub async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        self.open().await?.devices().await
    }

    /// Subscribe to device-state changes. The returned stream owns its
    /// connection and yields records until dropped; it cannot be restarted.
    pub async fn track_devices(&self) -> Result<DeviceEvents<TcpStream>> {
        let mut conn = self.open().await?;
        conn.request("host:track-devices").await?;
        Ok(DeviceEvents::new(conn.into_inner()))
    }

    /// Tell the server to shut down.
    pub async fn kill(&self) -> Result<()> {
        self.open().await?.request("host:kill").await
    }

    /// Switch a fresh connection into sync mode against `serial` and hand
    /// it to a [`SyncClient`].
    pub async fn sync(&self, serial: &str) -> Result<SyncClient<TcpStream>> {
        let mut conn = self.open().await?;
        conn.transport(serial).await?;
        conn.request("sync:").await?;
        Ok(SyncClient::new(conn.into_inner()))
    }

    /// Capture the device's framebuffer as a decoded RGBA image.
    pub async fn framebuffer(&self, serial: &str) -> Result<RgbaImage> {
        let mut conn = self.open().await?;
        conn.transport(serial).await?;
        conn.request("framebuffer:").await?;
        framebuffer::read_image(conn.stream()).await
    }

    /// Run a remote command through the shell-v2 protocol, returning its
    /// exit code. Arguments are single-quoted for the remote shell. Output
    /// lands in the caller's sinks as it arrives (pass
    /// [`tokio::io::sink()`] to discard a channel); stdin is pumped from
    /// `stdin` until exhausted, if supplied.
    pub async fn execute<I, O, E>(
        &self,
        serial: &str,
        command: &str,
        args: &[&str],
        stdin: Option<I>,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<u8>
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let mut conn = self.open().await?;
        conn.transport(serial).await?;
        let service = format!("shell,v2,raw:{}", shell::quote_command(command, args));
        conn.request(&service).await?;
        shell::run(conn.into_inner(), stdin, stdout, stderr).await
    }
}

/// One host-services conversation over an owned connection.
pub(crate) struct HostConnection<S> {
    stream: S,
}

impl<S> HostConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self { stream }
    }

    pub(crate) fn into_inner(self) -> S {
        self.stream
    }

    fn stream(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Issue one command and check its OKAY/FAIL status.
    pub(crate) async fn request(&mut self, command: &str) -> Result<()> {
        wire::send_request(&mut self.stream, command).await?;
        wire::read_status(&mut self.stream).await
    }

    /// Issue a command whose OKAY is followed by a hex-length-prefixed
    /// string payload.
    async fn request_string(&mut self, command: &str) -> Result<String> {
        self.request(command).await?;
        wire::read_hex_payload(&mut self.stream).await
    }

    /// Bind this connection to a device; later requests on it target
    /// `serial`.
    async fn transport(&mut self, serial: &str) -> Result<()> {
        self.request(&format!("host:transport:{}", serial)).await
    }

    pub(crate) async fn version(&mut self) -> Result<u32> {
        let payload = self.request_string("host:version").await?;
        u32::from_str_radix(payload.trim(), 16).map_err(|_| {
            AdbError::protocol(format!("host:version payload is not hex: {:?}", payload))
        })
    }

    pub(crate) async fn devices(&mut self) -> Result<Vec<DeviceRecord>> {
        let payload = self.request_string("host:devices").await?;
        DeviceRecord::parse_payload(&payload)
    }
}

/// Live, unbounded sequence of device records from `host:track-devices`.
///
/// Dropping the value cancels tracking and closes the connection; no error
/// is raised for that. The sequence is not restartable — subscribe again
/// through [`HostClient::track_devices`].
pub struct DeviceEvents<S> {
    stream: S,
    pending: VecDeque<DeviceRecord>,
}

impl<S> DeviceEvents<S>
where
    S: AsyncRead + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
        }
    }

    /// Wait for the next record. Blank keep-alive payloads are skipped; a
    /// payload that is not a `serial\tstate` line set is a fatal protocol
    /// error. Returns `Ok(None)` once the server closes the stream.
    pub async fn next(&mut self) -> Result<Option<DeviceRecord>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            // A clean close can only happen at a message boundary.
            let mut prefix = [0u8; 4];
            let n = self.stream.read(&mut prefix).await?;
            if n == 0 {
                debug!("device tracking stream closed by server");
                return Ok(None);
            }
            self.stream.read_exact(&mut prefix[n..]).await?;

            let len = wire::parse_hex_length(&prefix)?;
            let payload = wire::read_exact(&mut self.stream, len).await?;
            let payload = String::from_utf8(payload)
                .map_err(|e| AdbError::protocol(format!("payload is not UTF-8: {}", e)))?;

            for record in DeviceRecord::parse_payload(&payload)? {
                debug!("device event: {}", record);
                self.pending.push_back(record);
            }
        }
    }
}
