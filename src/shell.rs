//! Shell protocol v2: multiplexed stdin/stdout/stderr frames over one
//! connection, entered via a `shell,v2,raw:` service command.

use crate::error::{AdbError, Result};
use crate::wire;
use bytes::{BufMut, BytesMut};
use log::*;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio_util::task::AbortOnDropHandle;

// Frame ids. The remote only ever sends STDOUT, STDERR and EXIT.
const ID_STDIN: u8 = 0;
const ID_STDOUT: u8 = 1;
const ID_STDERR: u8 = 2;
const ID_EXIT: u8 = 3;
const ID_CLOSE_STDIN: u8 = 4;
#[allow(dead_code)]
const ID_WINDOW_SIZE_CHANGE: u8 = 5;

/// Local stdin is forwarded in frames of at most this many bytes.
const STDIN_CHUNK: usize = 8 * 1024;

/// Build the service command for `shell,v2,raw:`, quoting every argument.
pub(crate) fn quote_command(command: &str, args: &[&str]) -> String {
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        line.push_str(&quote_arg(arg));
    }
    line
}

// POSIX single-quote quoting: wrap in '...', inner quotes become '\''.
fn quote_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn encode_frame(id: u8, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(id);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf
}

/// Drive one shell-v2 exchange to completion over `stream`.
///
/// Remote stdout/stderr frames are demultiplexed into the caller's sinks in
/// arrival order. The optional stdin source is pumped from a background
/// task; whichever way the reader loop ends, that task is aborted and
/// joined before this returns, so no write races the dying connection. The
/// EXIT frame's single payload byte is the exit code.
pub(crate) async fn run<S, I, O, E>(
    stream: S,
    stdin: Option<I>,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<u8>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let (mut reader, writer) = io::split(stream);

    let writer_task = stdin
        .map(|source| AbortOnDropHandle::new(tokio::spawn(pump_stdin(writer, source))));

    let result = read_frames(&mut reader, stdout, stderr).await;

    if let Some(handle) = writer_task {
        handle.abort();
        if let Ok(Err(e)) = handle.await {
            debug!("stdin writer stopped early: {}", e);
        }
    }

    result
}

/// Forward the stdin source as STDIN frames, then announce end of input.
///
/// An abort between frames leaves the remote's stdin open; CLOSE_STDIN is
/// only written after the source is exhausted.
async fn pump_stdin<S, I>(mut writer: WriteHalf<S>, mut source: I) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
    I: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; STDIN_CHUNK];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&encode_frame(ID_STDIN, &buf[..n])).await?;
        writer.flush().await?;
    }
    writer.write_all(&encode_frame(ID_CLOSE_STDIN, &[])).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_frames<R, O, E>(reader: &mut R, stdout: &mut O, stderr: &mut E) -> Result<u8>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    loop {
        let id = reader.read_u8().await?;
        let len = reader.read_u32_le().await? as usize;
        let payload = wire::read_exact(reader, len).await?;

        match id {
            ID_STDOUT => stdout.write_all(&payload).await?,
            ID_STDERR => stderr.write_all(&payload).await?,
            ID_EXIT => {
                let code = payload.first().copied().ok_or_else(|| {
                    AdbError::protocol("EXIT frame arrived with an empty payload")
                })?;
                stdout.flush().await?;
                stderr.flush().await?;
                debug!("shell exited with code {}", code);
                return Ok(code);
            }
            other => {
                return Err(AdbError::protocol(format!(
                    "unexpected shell frame id {} ({} byte payload)",
                    other, len
                )))
            }
        }
    }
}
