//! File-sync protocol client: push, pull, stat and list over a connection
//! already switched into sync mode with the `sync:` service command.

use crate::error::{AdbError, Result};
use crate::wire;
use bytes::{BufMut, BytesMut};
use log::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Largest payload the protocol allows in one DATA frame.
const MAX_CHUNK: usize = 64 * 1024;

// File mode constants (from stat.h)
const S_IFMT: u32 = 0o170000; // bit mask for the file type bit field
const S_IFSOCK: u32 = 0o140000; // socket
const S_IFLNK: u32 = 0o120000; // symbolic link
const S_IFREG: u32 = 0o100000; // regular file
const S_IFBLK: u32 = 0o060000; // block device
const S_IFDIR: u32 = 0o040000; // directory
const S_IFCHR: u32 = 0o020000; // character device
const S_IFIFO: u32 = 0o010000; // FIFO

/// Metadata for one remote path.
///
/// For `stat` the path is the one the caller asked about (the wire response
/// carries no path); for `list` entries it is the name the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub path: String,
    /// Platform file-mode bits, type and permissions.
    pub mode: u32,
    pub size: u32,
    /// Modification time, whole seconds since the Unix epoch.
    pub mtime: u32,
}

impl StatEntry {
    pub fn is_dir(&self) -> bool {
        (self.mode & S_IFMT) == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        (self.mode & S_IFMT) == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        (self.mode & S_IFMT) == S_IFLNK
    }

    pub fn file_type(&self) -> &'static str {
        match self.mode & S_IFMT {
            S_IFSOCK => "socket",
            S_IFLNK => "symlink",
            S_IFREG => "file",
            S_IFBLK => "block",
            S_IFDIR => "directory",
            S_IFCHR => "char",
            S_IFIFO => "fifo",
            _ => "unknown",
        }
    }

    pub fn permissions(&self) -> String {
        format!("{:03o}", self.mode & 0o777)
    }
}

/// File-sync operations over an exclusively owned connection.
///
/// The wire protocol has no multiplexing, so all operations serialize on an
/// internal lock; concurrent calls on one client never interleave. A
/// canceled (dropped) operation leaves the connection at an undefined byte
/// position — discard the client and open a new one.
pub struct SyncClient<S> {
    conn: Mutex<S>,
}

impl<S> SyncClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            conn: Mutex::new(stream),
        }
    }

    /// Stat a remote path.
    pub async fn stat(&self, path: &str) -> Result<StatEntry> {
        let mut conn = self.conn.lock().await;
        send_request(&mut *conn, b"STAT", path.as_bytes()).await?;

        let tag = read_tag(&mut *conn).await?;
        match &tag {
            b"STAT" => {
                let mode = conn.read_u32_le().await?;
                let size = conn.read_u32_le().await?;
                let mtime = conn.read_u32_le().await?;
                Ok(StatEntry {
                    path: path.to_string(),
                    mode,
                    size,
                    mtime,
                })
            }
            b"FAIL" => failed(&mut *conn).await,
            other => Err(unexpected_tag("STAT", other)),
        }
    }

    /// List a remote directory, in server-delivery order.
    pub async fn list(&self, path: &str) -> Result<Vec<StatEntry>> {
        let mut conn = self.conn.lock().await;
        send_request(&mut *conn, b"LIST", path.as_bytes()).await?;

        let mut entries = Vec::new();
        loop {
            let tag = read_tag(&mut *conn).await?;
            match &tag {
                b"DENT" => {
                    let mode = conn.read_u32_le().await?;
                    let size = conn.read_u32_le().await?;
                    let mtime = conn.read_u32_le().await?;
                    let name = wire::read_le_string(&mut *conn).await?;
                    entries.push(StatEntry {
                        path: name,
                        mode,
                        size,
                        mtime,
                    });
                }
                // Bookkeeping stat records some servers emit; drain and move on.
                b"STAT" => {
                    wire::read_exact(&mut *conn, 12).await?;
                }
                // DONE always carries one final, meaningless stat record.
                b"DONE" => {
                    wire::read_exact(&mut *conn, 16).await?;
                    break;
                }
                b"FAIL" => return failed(&mut *conn).await,
                other => return Err(unexpected_tag("LIST", other)),
            }
        }
        debug!("listed {} entries under {}", entries.len(), path);
        Ok(entries)
    }

    /// Pull a remote file, writing its content to `sink`. Returns the byte
    /// count transferred.
    pub async fn pull<W>(&self, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut conn = self.conn.lock().await;
        send_request(&mut *conn, b"RECV", path.as_bytes()).await?;

        let mut total = 0u64;
        loop {
            let tag = read_tag(&mut *conn).await?;
            match &tag {
                b"DATA" => {
                    let len = conn.read_u32_le().await? as usize;
                    if len > MAX_CHUNK {
                        return Err(AdbError::protocol(format!(
                            "DATA chunk of {} bytes exceeds the {} byte limit",
                            len, MAX_CHUNK
                        )));
                    }
                    let chunk = wire::read_exact(&mut *conn, len).await?;
                    sink.write_all(&chunk).await?;
                    total += len as u64;
                }
                b"DONE" => {
                    // Legacy trailing field; historically a CRC, ignored.
                    conn.read_u32_le().await?;
                    break;
                }
                b"FAIL" => return failed(&mut *conn).await,
                other => return Err(unexpected_tag("RECV", other)),
            }
        }
        sink.flush().await?;
        debug!("pulled {} bytes from {}", total, path);
        Ok(total)
    }

    /// Push `source` to a remote path, chunking transparently. `mode` is
    /// masked to its permission bits; `mtime` becomes the remote
    /// modification time, truncated to whole seconds.
    pub async fn push<R>(
        &self,
        path: &str,
        mode: u32,
        mtime: SystemTime,
        source: &mut R,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut conn = self.conn.lock().await;
        let spec = format!("{},0{:o}", path, mode & 0o777);
        send_request(&mut *conn, b"SEND", spec.as_bytes()).await?;

        let mut buf = vec![0u8; MAX_CHUNK];
        let mut total = 0u64;
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            write_header(&mut *conn, b"DATA", n as u32).await?;
            conn.write_all(&buf[..n]).await?;
            total += n as u64;
        }

        let seconds = mtime
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        write_header(&mut *conn, b"DONE", seconds).await?;
        conn.flush().await?;

        let tag = read_tag(&mut *conn).await?;
        match &tag {
            b"OKAY" => {
                // Same legacy trailer as pull's DONE.
                conn.read_u32_le().await?;
                debug!("pushed {} bytes to {}", total, path);
                Ok(total)
            }
            b"FAIL" => failed(&mut *conn).await,
            other => Err(unexpected_tag("SEND", other)),
        }
    }

    /// Push a local file, carrying its permission bits and mtime over.
    pub async fn push_file(&self, local: impl AsRef<Path>, remote: &str) -> Result<u64> {
        let local = local.as_ref();
        let mut file = tokio::fs::File::open(local).await?;
        let metadata = file.metadata().await?;
        let mtime = metadata.modified()?;
        info!("pushing {} to {}", local.display(), remote);
        self.push(remote, file_mode(&metadata), mtime, &mut file)
            .await
    }

    /// Pull a remote file into a local path, creating or truncating it.
    pub async fn pull_file(&self, remote: &str, local: impl AsRef<Path>) -> Result<u64> {
        let local = local.as_ref();
        let mut file = tokio::fs::File::create(local).await?;
        info!("pulling {} to {}", remote, local.display());
        self.pull(remote, &mut file).await
    }
}

/// Sync request: 4-byte ASCII tag, u32 LE length, then the payload bytes.
async fn send_request<S>(conn: &mut S, tag: &[u8; 4], payload: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_header(conn, tag, payload.len() as u32).await?;
    conn.write_all(payload).await?;
    conn.flush().await?;
    Ok(())
}

/// Bare sync header; the length field's meaning depends on the tag (payload
/// length for most, a timestamp for DONE).
async fn write_header<S>(conn: &mut S, tag: &[u8; 4], value: u32) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(8);
    buf.put_slice(tag);
    buf.put_u32_le(value);
    conn.write_all(&buf).await?;
    Ok(())
}

async fn read_tag<S>(conn: &mut S) -> Result<[u8; 4]>
where
    S: AsyncRead + Unpin,
{
    let mut tag = [0u8; 4];
    conn.read_exact(&mut tag).await?;
    Ok(tag)
}

/// Drain a FAIL payload (u32 LE length + message) and surface the server's
/// message verbatim.
async fn failed<S, T>(conn: &mut S) -> Result<T>
where
    S: AsyncRead + Unpin,
{
    let len = conn.read_u32_le().await? as usize;
    let message = wire::read_exact(conn, len).await?;
    Err(AdbError::Server(
        String::from_utf8_lossy(&message).into_owned(),
    ))
}

fn unexpected_tag(request: &str, tag: &[u8; 4]) -> AdbError {
    AdbError::protocol(format!(
        "unexpected {} response tag {:?}",
        request,
        String::from_utf8_lossy(tag)
    ))
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
