/// Bounded output collection
///
/// Reads a child's combined stdout/stderr pipe on a helper thread. Bytes past
/// the limit are drained and discarded so the writer never blocks on a full pipe.
use crate::config::types::{GraderError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

const CHUNK_SIZE: usize = 4096;

/// Output collected from one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedOutput {
    pub bytes: Vec<u8>,
    /// More bytes were written than the limit allowed
    pub truncated: bool,
    /// Collection ended on a read error or never finished
    pub read_error: Option<String>,
}

impl CollectedOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Output collector with bounded collection
#[derive(Debug, Clone, Copy)]
pub struct OutputCollector {
    limit: usize,
}

/// Pending collection; `wait` takes the result
#[derive(Debug)]
pub struct OutputHandle {
    rx: Receiver<CollectedOutput>,
}

impl OutputCollector {
    pub fn new(limit: usize) -> Self {
        OutputCollector { limit }
    }

    /// Start collecting from `stream` until EOF
    pub fn spawn<R: Read + Send + 'static>(&self, stream: R) -> Result<OutputHandle> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let limit = self.limit;
        thread::Builder::new()
            .name("output-collector".to_string())
            .spawn(move || {
                let _ = tx.send(collect_stream(stream, limit));
            })
            .map_err(GraderError::Io)?;
        Ok(OutputHandle { rx })
    }
}

impl OutputHandle {
    /// Wait up to `grace` for EOF. Every writer should already be dead when
    /// this is called; a writer that escaped the process group can hold the
    /// pipe open, in which case the output is reported as lost.
    pub fn wait(self, grace: Duration) -> CollectedOutput {
        match self.rx.recv_timeout(grace) {
            Ok(output) => output,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Output pipe still open {:?} after the run ended", grace);
                CollectedOutput {
                    read_error: Some("output collection timed out".to_string()),
                    ..CollectedOutput::default()
                }
            }
            Err(RecvTimeoutError::Disconnected) => CollectedOutput {
                read_error: Some("output collector exited without a result".to_string()),
                ..CollectedOutput::default()
            },
        }
    }
}

/// Collect from a single stream with limit
fn collect_stream<R: Read>(mut stream: R, limit: usize) -> CollectedOutput {
    let mut output = CollectedOutput::default();
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(output.bytes.len());
                if n > room {
                    output.truncated = true;
                }
                output.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                output.read_error = Some(e.to_string());
                break;
            }
        }
    }

    output
}
