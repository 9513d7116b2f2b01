//! Append-only text sinks for run reports.
//!
//! A sink is cheap to clone and every clone appends to the same destination.
//! Each `println` takes the sink's lock for one whole line, so lines from
//! concurrent tasks never interleave mid-line.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::SinkError;

enum SinkTarget {
    File(LineWriter<File>),
    Memory(Vec<u8>),
}

/// A named, shared, append-only text destination.
#[derive(Clone)]
pub struct OutputSink {
    name: String,
    path: Option<PathBuf>,
    target: Arc<Mutex<SinkTarget>>,
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl OutputSink {
    /// Create (or truncate) a file sink.
    pub fn file(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|e| SinkError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: path.display().to_string(),
            path: Some(path.to_path_buf()),
            target: Arc::new(Mutex::new(SinkTarget::File(LineWriter::new(file)))),
        })
    }

    /// An in-memory sink, readable back through [`contents`](Self::contents).
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            target: Arc::new(Mutex::new(SinkTarget::Memory(Vec::new()))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether both handles append to the same destination.
    pub fn same_as(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }

    /// Append `line` followed by a newline.
    ///
    /// The write is blocking and holds the sink lock, so callers on the async
    /// runtime stall their worker for one line. Report lines are short; move
    /// writes to `spawn_blocking` if sinks ever carry bulk output.
    pub fn println(&self, line: &str) -> Result<(), SinkError> {
        let mut target = self.target.lock().map_err(|_| SinkError::LockPoisoned {
            sink: self.name.clone(),
        })?;
        let result = match &mut *target {
            SinkTarget::File(writer) => writeln!(writer, "{}", line),
            SinkTarget::Memory(buf) => writeln!(buf, "{}", line),
        };
        result.map_err(|e| SinkError::Write {
            sink: self.name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        let mut target = self.target.lock().map_err(|_| SinkError::LockPoisoned {
            sink: self.name.clone(),
        })?;
        if let SinkTarget::File(writer) = &mut *target {
            writer.flush().map_err(|e| SinkError::Write {
                sink: self.name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Everything written so far, for memory sinks.
    pub fn contents(&self) -> Option<String> {
        let target = self.target.lock().ok()?;
        match &*target {
            SinkTarget::Memory(buf) => Some(String::from_utf8_lossy(buf).into_owned()),
            SinkTarget::File(_) => None,
        }
    }

    /// Lines written so far, for memory sinks. Empty for file sinks.
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// The single output root. Dedicated filenames are joined onto it.
///
/// Opening the same filename twice returns the same sink, so two checks that
/// share a report file append to one destination instead of truncating it.
#[derive(Debug)]
pub struct OutputDirectory {
    root: Option<PathBuf>,
    opened: Mutex<HashMap<String, OutputSink>>,
}

impl OutputDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            opened: Mutex::new(HashMap::new()),
        }
    }

    /// A directory whose sinks all live in memory. Used for dry runs and tests.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            opened: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Display path for `filename` under this directory.
    pub fn display_path(&self, filename: &str) -> String {
        match &self.root {
            Some(root) => root.join(filename).display().to_string(),
            None => filename.to_string(),
        }
    }

    pub fn open(&self, filename: &str) -> Result<OutputSink, SinkError> {
        let mut opened = self.opened.lock().map_err(|_| SinkError::LockPoisoned {
            sink: filename.to_string(),
        })?;
        if let Some(sink) = opened.get(filename) {
            return Ok(sink.clone());
        }
        let sink = match &self.root {
            Some(root) => OutputSink::file(&root.join(filename))?,
            None => OutputSink::memory(filename),
        };
        opened.insert(filename.to_string(), sink.clone());
        Ok(sink)
    }
}
