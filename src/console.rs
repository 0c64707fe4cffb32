use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Shared output sink. Every block is written under one lock so output from
/// different targets never interleaves inside a block.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn write_block(&self, block: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(block.as_bytes()).and_then(|_| out.flush()) {
            debug!("Failed to write to console: {}", e);
        }
    }
}

/// In-memory sink for inspecting rendered output in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Capture {
    pub fn console(&self) -> Console {
        Console::from_writer(self.clone())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
