//! Run log: every report line goes to the console and to the log file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::errors::AuditResult;
use crate::store::database::resolve_path;

type Sink = Box<dyn Write + Send>;

struct Sinks {
    console: Sink,
    file: Option<Sink>,
}

/// One handle per run, opened (truncated) at run start and flushed on drop.
pub struct RunLog {
    sinks: Mutex<Sinks>,
}

impl RunLog {
    /// Console on stdout, log file at `path` (truncated).
    pub fn open(path: &Path) -> AuditResult<Self> {
        let resolved = resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&resolved)?;
        Ok(Self::with_writers(
            Box::new(io::stdout()),
            Some(Box::new(BufWriter::new(file))),
        ))
    }

    pub fn with_writers(console: Sink, file: Option<Sink>) -> Self {
        Self {
            sinks: Mutex::new(Sinks { console, file }),
        }
    }

    /// Write `text` plus a trailing newline to both sinks.
    pub fn line(&self, text: &str) -> AuditResult<()> {
        let mut sinks = self.sinks.lock();
        writeln!(sinks.console, "{text}")?;
        if let Some(file) = sinks.file.as_mut() {
            writeln!(file, "{text}")?;
        }
        Ok(())
    }

    pub fn blank(&self) -> AuditResult<()> {
        self.line("")
    }

    pub fn flush(&self) -> AuditResult<()> {
        let mut sinks = self.sinks.lock();
        sinks.console.flush()?;
        if let Some(file) = sinks.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// In-memory sink whose contents stay readable after the log takes ownership.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A log whose console and file sinks are both in-memory buffers.
#[cfg(test)]
pub(crate) fn buffered_log() -> (RunLog, SharedBuffer, SharedBuffer) {
    let console = SharedBuffer::default();
    let file = SharedBuffer::default();
    let log = RunLog::with_writers(Box::new(console.clone()), Some(Box::new(file.clone())));
    (log, console, file)
}
