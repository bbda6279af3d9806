use std::{
    fs::File,
    io::{self, Write},
    path::Path,
    sync::Mutex,
};

use crate::Result;

/// Append-only destination for status blocks, deadlock descriptions and the
/// final summary.
///
/// Called concurrently by the observer and the simulation; every
/// implementation serializes its own appends so chunks never interleave.
pub trait Sink: Send + Sync {
    fn append(&self, text: &str) -> Result;
}

/// Writes to a file, truncated on creation.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Sink for FileSink {
    fn append(&self, text: &str) -> Result {
        let mut file = self.file.lock().expect("FileSink lock poisoned");
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps every appended chunk in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    chunks: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every chunk appended so far, in order.
    pub fn chunks(&self) -> Vec<String> {
        self.chunks.lock().expect("MemorySink lock poisoned").clone()
    }

    pub fn contents(&self) -> String {
        self.chunks.lock().expect("MemorySink lock poisoned").concat()
    }
}

impl Sink for MemorySink {
    fn append(&self, text: &str) -> Result {
        self.chunks
            .lock()
            .expect("MemorySink lock poisoned")
            .push(text.to_owned());
        Ok(())
    }
}

/// Prints to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn append(&self, text: &str) -> Result {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
