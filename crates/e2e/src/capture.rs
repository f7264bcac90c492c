//! Background capture of subprocess output streams

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::warn;

use crate::error::{E2eError, E2eResult};

const READ_CHUNK: usize = 8192;

/// Accumulates subprocess output on background reader threads.
///
/// Lifecycle: [`attach`](Self::attach) one or more pipes while the owning
/// process runs, [`halt`](Self::halt) once it has exited, then read the
/// finalized buffer. Reading earlier would race the reader threads, so it
/// is refused.
pub struct StreamCapturer {
    sink: Arc<Mutex<Vec<u8>>>,
    readers: Vec<JoinHandle<()>>,
    echo: bool,
    halted: bool,
}

impl StreamCapturer {
    /// `echo` mirrors captured chunks to the harness's own stdout as they
    /// arrive, so a live run stays watchable while still being buffered.
    pub fn new(echo: bool) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Vec::new())),
            readers: Vec::new(),
            echo,
            halted: false,
        }
    }

    /// Spawn a reader thread draining `stream` into the shared buffer.
    ///
    /// A child's stdout and stderr can both be attached to combine them
    /// into one interleaved capture.
    pub fn attach<R>(&mut self, mut stream: R)
    where
        R: Read + Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        let echo = self.echo;
        self.readers.push(std::thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if echo {
                            let mut out = std::io::stdout();
                            let _ = out.write_all(&chunk[..n]);
                            let _ = out.flush();
                        }
                        sink.lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]);
                    }
                    Err(e) => {
                        warn!("capture read error: {}", e);
                        break;
                    }
                }
            }
        }));
    }

    /// Join all reader threads and finalize the buffer.
    ///
    /// Call only after the owning subprocess has exited: the readers run
    /// to EOF, which the child's exit guarantees once its pipe ends close.
    pub fn halt(&mut self) {
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The finalized captured bytes. Refused while readers are active.
    pub fn buffer(&self) -> E2eResult<Vec<u8>> {
        if !self.halted {
            return Err(E2eError::CaptureActive);
        }
        Ok(self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    /// Finalized buffer decoded lossily, once per subprocess.
    pub fn text(&self) -> E2eResult<String> {
        Ok(String::from_utf8_lossy(&self.buffer()?).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn buffer_is_refused_until_halted() {
        let mut capturer = StreamCapturer::new(false);
        capturer.attach(Cursor::new(b"partial output".to_vec()));
        assert!(matches!(capturer.buffer(), Err(E2eError::CaptureActive)));

        capturer.halt();
        assert!(capturer.is_halted());
        assert_eq!(capturer.buffer().unwrap(), b"partial output");
    }

    #[test]
    fn combines_multiple_streams() {
        let mut capturer = StreamCapturer::new(false);
        capturer.attach(Cursor::new(b"out".to_vec()));
        capturer.attach(Cursor::new(b"err".to_vec()));
        capturer.halt();

        let text = capturer.text().unwrap();
        assert_eq!(text.len(), 6);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn empty_capture_finalizes_empty() {
        let mut capturer = StreamCapturer::new(true);
        capturer.halt();
        assert!(capturer.buffer().unwrap().is_empty());
    }
}
