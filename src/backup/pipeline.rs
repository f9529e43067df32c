// dbbackup/src/backup/pipeline.rs
//! Streams `dump | compress` into an object writer.
//!
//! The dump's stdout is the write end of the compressor's stdin pipe, so the
//! uncompressed dump never passes through this process. Only the compressed
//! bytes are read here, in bounded chunks, and handed to the writer as they
//! arrive.

use std::process::{ExitStatus, Stdio};

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::{AppError, Result};
use crate::storage::ObjectWriter;

const CHUNK_SIZE: usize = 64 * 1024;

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    cmd.kill_on_drop(true)
        .spawn()
        .map_err(|source| AppError::Spawn {
            program: program_name(cmd),
            source,
        })
}

async fn wait_for(stage: &'static str, child: &mut Child) -> Result<ExitStatus> {
    let status = child.wait().await?;
    if !status.success() {
        return Err(AppError::Process { stage, status });
    }
    debug!(stage, %status, "Process finished");
    Ok(status)
}

async fn pump<R>(reader: R, writer: &mut dyn ObjectWriter) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut chunks = ReaderStream::with_capacity(reader, CHUNK_SIZE);
    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        writer.write(chunk).await?;
    }
    Ok(total)
}

/// Runs `dump | compress` and writes the compressed output to `writer`.
///
/// The compressor is started first, then the dump runs to completion, then the
/// compressor is waited on while its output keeps draining. A failed dump fails
/// the call without waiting for the compressor. Both children are killed if
/// the call returns early. Returns the number of compressed bytes written.
pub async fn stream_pipeline(
    mut dump: Command,
    mut compress: Command,
    writer: &mut dyn ObjectWriter,
) -> Result<u64> {
    compress
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    let mut compressor = spawn(&mut compress)?;

    let compressor_stdin = compressor
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("compressor stdin was not captured"))?;
    let compressed = compressor
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("compressor stdout was not captured"))?;

    let dump_stdout: Stdio = compressor_stdin.try_into()?;
    dump.stdout(dump_stdout).stderr(Stdio::inherit());
    let spawned = spawn(&mut dump);
    // The command still owns our copy of the pipe's write end; the compressor
    // only sees EOF once it is closed.
    drop(dump);
    let mut dumper = spawned?;

    let processes = async {
        wait_for("dump", &mut dumper).await?;
        wait_for("compress", &mut compressor).await
    };

    let (written, _) = tokio::try_join!(pump(compressed, writer), processes)?;
    Ok(written)
}
