//! Terminal input and output.

use std::io::{BufRead, BufReader, Stdin, Write};
use std::sync::Mutex;

use parley_core::Result;

use crate::channel::OutputChannel;

/// Typing this ends a console conversation.
pub const STOP_COMMAND: &str = "/stop";

/// Writes bot messages to a terminal (or any writer).
pub struct ConsoleOutputChannel {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleOutputChannel {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl OutputChannel for ConsoleOutputChannel {
    fn send_text_message(&self, _recipient_id: &str, message: &str) {
        if let Ok(mut out) = self.out.lock() {
            if let Err(e) = writeln!(out, "{message}").and_then(|_| out.flush()) {
                tracing::warn!(error = %e, "Failed to write bot message to console");
            }
        }
    }
}

/// Reads user messages line by line until [`STOP_COMMAND`] or end of input.
pub struct ConsoleInputChannel<R> {
    reader: R,
    sender_id: String,
}

impl ConsoleInputChannel<BufReader<Stdin>> {
    /// Read from the process's stdin without holding its lock between
    /// lines, so other prompts in the same process can read too.
    pub fn stdin(sender_id: impl Into<String>) -> Self {
        // Stdin buffers internally; a one-byte buffer here never reads past a newline.
        Self::new(BufReader::with_capacity(1, std::io::stdin()), sender_id)
    }
}

impl<R: BufRead> ConsoleInputChannel<R> {
    pub fn new(reader: R, sender_id: impl Into<String>) -> Self {
        Self {
            reader,
            sender_id: sender_id.into(),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// The next non-empty message, or `None` once the user is done.
    pub fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let text = line.trim();
            if text == STOP_COMMAND {
                return Ok(None);
            }
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_input_stops_at_stop_command() {
        let input = Cursor::new("hello\n\n/greet\n/stop\nignored\n");
        let mut channel = ConsoleInputChannel::new(input, "default");
        assert_eq!(channel.next_message().unwrap().as_deref(), Some("hello"));
        assert_eq!(channel.next_message().unwrap().as_deref(), Some("/greet"));
        assert_eq!(channel.next_message().unwrap(), None);
    }

    #[test]
    fn test_input_ends_at_eof() {
        let mut channel = ConsoleInputChannel::new(Cursor::new("hi"), "default");
        assert_eq!(channel.next_message().unwrap().as_deref(), Some("hi"));
        assert_eq!(channel.next_message().unwrap(), None);
    }

    #[test]
    fn test_output_writes_lines() {
        let buf = SharedBuf::default();
        let channel = ConsoleOutputChannel::new(Box::new(buf.clone()));
        channel.send_text_message("default", "Hello");
        channel.send_image_url("default", "https://example.com/a.png");
        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "Hello\nImage: https://example.com/a.png\n");
    }
}
