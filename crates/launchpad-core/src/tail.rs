//! Polling tail of the persisted server log.
//!
//! Used when a server is already running and there are no pipes to read.
//! Only lines appended after attach are streamed. At end of file the tailer
//! sleeps a fixed interval and retries; this is polling rather than a
//! filesystem watch so it behaves the same on every filesystem.

use crate::error::{LauncherError, Result};
use crate::process::decode_line;
use crate::sink::{system_line, SharedSink};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

/// Entry point for tailing a log file.
pub struct LogTailer;

impl LogTailer {
    /// Open `path` and position at its current end.
    pub async fn attach(path: impl AsRef<Path>, interval: Duration) -> Result<AttachedTail> {
        let path = path.as_ref().to_path_buf();

        let mut file = File::open(&path).await.map_err(|e| LauncherError::LogTail {
            path: path.clone(),
            source: e,
        })?;
        let offset = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| LauncherError::LogTail {
                path: path.clone(),
                source: e,
            })?;

        info!("Tailing {} from offset {}", path.display(), offset);

        Ok(AttachedTail {
            path,
            reader: BufReader::new(file),
            interval,
        })
    }

    /// Attach and stream until the task is cancelled or a read fails.
    ///
    /// A file that cannot be opened is reported once to the sink.
    pub async fn tail(path: impl AsRef<Path>, interval: Duration, sink: SharedSink) {
        match Self::attach(path, interval).await {
            Ok(tail) => tail.run(sink).await,
            Err(e) => {
                warn!("{}", e);
                system_line(sink.as_ref(), e.to_string());
            }
        }
    }
}

/// A log file positioned at its end at attach time.
#[derive(Debug)]
pub struct AttachedTail {
    path: PathBuf,
    reader: BufReader<File>,
    interval: Duration,
}

impl AttachedTail {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream complete lines to the sink. Never returns unless a read fails.
    pub async fn run(mut self, sink: SharedSink) {
        // Holds a partial line until its newline arrives
        let mut pending = Vec::new();

        loop {
            match self.reader.read_until(b'\n', &mut pending).await {
                Ok(0) => tokio::time::sleep(self.interval).await,
                Ok(_) => {
                    if pending.ends_with(b"\n") {
                        sink.log_line(&decode_line(&pending));
                        pending.clear();
                    }
                }
                Err(e) => {
                    debug!("Stopped tailing {}: {}", self.path.display(), e);
                    return;
                }
            }
        }
    }
}
