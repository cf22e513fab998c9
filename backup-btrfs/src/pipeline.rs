// SPDX-License-Identifier: GPL-3.0-only

//! `btrfs send | btrfs receive`
//!
//! Both processes run concurrently. Two tasks pump the send stream into the
//! receive process through a bounded channel; the transfer only succeeds if
//! both processes exit cleanly.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{BtrfsError, Result};

/// Bytes read from the sender per chunk
const CHUNK_SIZE: usize = 1024 * 1024;

/// Chunks buffered between the two processes
const PIPE_DEPTH: usize = 16;

#[derive(Debug)]
pub struct PipeOutcome {
    pub bytes: u64,
    pub send_status: ExitStatus,
    pub receive_status: ExitStatus,
}

impl PipeOutcome {
    pub fn success(&self) -> bool {
        self.send_status.success() && self.receive_status.success()
    }
}

/// Run `sender` and `receiver`, streaming the sender's stdout into the receiver's stdin
pub async fn pipe(mut sender: Command, mut receiver: Command) -> Result<PipeOutcome> {
    sender.stdin(Stdio::null()).stdout(Stdio::piped());
    receiver.stdin(Stdio::piped());

    let mut send_child = sender.spawn()?;
    let mut receive_child = match receiver.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = send_child.kill().await;
            return Err(e.into());
        }
    };

    let mut send_out = send_child
        .stdout
        .take()
        .ok_or_else(|| BtrfsError::OperationFailed("sender has no stdout".to_string()))?;
    let mut receive_in = receive_child
        .stdin
        .take()
        .ok_or_else(|| BtrfsError::OperationFailed("receiver has no stdin".to_string()))?;

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(PIPE_DEPTH);

    let reader = tokio::spawn(async move {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let read = send_out.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            total += read as u64;
            if tx.send(buffer[..read].to_vec()).await.is_err() {
                // The writer is gone, the receiver failed.
                break;
            }
        }
        Ok::<u64, std::io::Error>(total)
    });

    let writer = tokio::spawn(async move {
        let mut total: u64 = 0;
        while let Some(chunk) = rx.recv().await {
            receive_in.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        receive_in.shutdown().await?;
        Ok::<u64, std::io::Error>(total)
    });

    let (read_result, write_result) = tokio::join!(reader, writer);
    let send_status = send_child.wait().await?;
    let receive_status = receive_child.wait().await?;

    let outcome = |bytes| PipeOutcome {
        bytes,
        send_status,
        receive_status,
    };

    if !send_status.success() || !receive_status.success() {
        return Ok(outcome(0));
    }

    let read = read_result
        .map_err(|e| BtrfsError::OperationFailed(format!("send pump panicked: {e}")))??;
    let written = write_result
        .map_err(|e| BtrfsError::OperationFailed(format!("receive pump panicked: {e}")))??;
    if read != written {
        return Err(BtrfsError::OperationFailed(format!(
            "stream truncated: read {read} bytes, wrote {written} bytes"
        )));
    }

    Ok(outcome(written))
}

/// Clone `snapshot` into `target_root`, incrementally against `baseline` if given
pub async fn send_receive(
    btrfs: &Path,
    snapshot: &Path,
    baseline: Option<&Path>,
    target_root: &Path,
    verbose: bool,
) -> Result<u64> {
    let mut sender = Command::new(btrfs);
    sender.arg("send");
    if verbose {
        sender.arg("--verbose");
    }
    if let Some(baseline) = baseline {
        sender.arg("-p").arg(baseline);
    }
    sender.arg(snapshot);

    let mut receiver = Command::new(btrfs);
    receiver.arg("receive");
    if verbose {
        receiver.arg("-v");
    }
    receiver.arg(target_root);

    debug!("{:?} | {:?}", sender.as_std(), receiver.as_std());
    let outcome = pipe(sender, receiver).await?;
    if !outcome.success() {
        warn!(
            "btrfs send exited with {}, btrfs receive exited with {}",
            outcome.send_status, outcome.receive_status
        );
        return Err(BtrfsError::PipelineFailed {
            send: outcome.send_status.to_string(),
            receive: outcome.receive_status.to_string(),
        });
    }

    info!(
        "sent {} bytes from {} to {}",
        outcome.bytes,
        snapshot.display(),
        target_root.display()
    );
    Ok(outcome.bytes)
}
