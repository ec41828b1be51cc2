//! Framing primitives shared by the host, sync, shell and framebuffer
//! clients.
//!
//! Fixed-width integers ride on tokio's `read_u32_le`-style helpers; this
//! module adds the two string framings the protocol families use (a
//! 4-hex-digit ASCII length for host services, a 4-byte little-endian length
//! for sync payloads) and the OKAY/FAIL status dispatch.
//!
//! Every function is a suspension point. Dropping a future mid-read or
//! mid-write abandons the connection at an unknown byte position; the caller
//! must close it.

use crate::error::{AdbError, Result};
use log::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read exactly `n` bytes. A stream that ends early surfaces as a
/// connection error.
pub(crate) async fn read_exact<S>(stream: &mut S, n: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

#[allow(dead_code)]
pub(crate) async fn read_u64_le<S>(stream: &mut S) -> Result<u64>
where
    S: AsyncRead + Unpin,
{
    Ok(stream.read_u64_le().await?)
}

/// Send a host-services request: a 4-character uppercase hex ASCII length
/// followed by the command bytes.
pub(crate) async fn send_request<S>(stream: &mut S, command: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    debug!("host request: {}", command);
    let request = format!("{:04X}{}", command.len(), command);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Read a 4-hex-digit ASCII length, then that many bytes, as UTF-8.
pub(crate) async fn read_hex_payload<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    let len = parse_hex_length(&prefix)?;
    let payload = read_exact(stream, len).await?;
    String::from_utf8(payload)
        .map_err(|e| AdbError::protocol(format!("payload is not UTF-8: {}", e)))
}

pub(crate) fn parse_hex_length(prefix: &[u8; 4]) -> Result<usize> {
    std::str::from_utf8(prefix)
        .ok()
        .and_then(|text| usize::from_str_radix(text, 16).ok())
        .ok_or_else(|| AdbError::protocol(format!("length prefix is not ASCII hex: {:?}", prefix)))
}

/// Read a 4-byte little-endian length, then that many bytes, as UTF-8. The
/// sync protocol frames directory-entry names this way.
pub(crate) async fn read_le_string<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u32_le().await? as usize;
    let payload = read_exact(stream, len).await?;
    String::from_utf8(payload)
        .map_err(|e| AdbError::protocol(format!("payload is not UTF-8: {}", e)))
}

/// Read the 4-byte status that answers every host request. FAIL carries a
/// hex-length-prefixed message which is surfaced verbatim; anything that is
/// neither OKAY nor FAIL is a protocol violation.
pub(crate) async fn read_status<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut status = [0u8; 4];
    stream.read_exact(&mut status).await?;
    match &status {
        b"OKAY" => Ok(()),
        b"FAIL" => {
            let message = read_hex_payload(stream).await?;
            debug!("host request failed: {}", message);
            Err(AdbError::Server(message))
        }
        other => Err(AdbError::protocol(format!(
            "expected OKAY or FAIL, got {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}
