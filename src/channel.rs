use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::ops::{Deref, DerefMut};

/// In-memory substitute for the candidate's standard input and output.
///
/// The channel is passed down explicitly to whatever runs candidate code;
/// there is no process-global stream swapping. While acquired, reads are
/// served from a scripted line sequence and writes accumulate into a
/// buffer. Released, the channel passes through to the real streams.
#[derive(Debug, Default)]
pub struct Channel {
    captured: bool,
    script: VecDeque<String>,
    buffer: String,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to captured mode with `inputs` as the scripted stdin and
    /// returns a guard. Dropping the guard releases the channel on every
    /// exit path, fault paths included; the output buffer survives release
    /// so it can still be parsed.
    pub fn acquire(&mut self, inputs: &[String]) -> ChannelGuard<'_> {
        self.captured = true;
        self.script = inputs.iter().cloned().collect();
        ChannelGuard { channel: self }
    }

    /// Empties the output buffer without changing redirection state.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Captured output so far.
    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Next input line. Captured: pops the script, `None` once exhausted.
    /// Released: reads the real stdin.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        if self.captured {
            return Ok(self.script.pop_front());
        }
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Writes candidate output. Captured output lands only in the buffer,
    /// never on the real stream, so engine diagnostics are never
    /// interleaved with candidate output.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        if self.captured {
            self.buffer.push_str(text);
            return Ok(());
        }
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.write(text)?;
        self.write("\n")
    }

    fn release(&mut self) {
        self.captured = false;
        self.script.clear();
    }
}

/// Scoped handle to an acquired [`Channel`]. Restores pass-through mode on
/// drop.
#[derive(Debug)]
pub struct ChannelGuard<'a> {
    channel: &'a mut Channel,
}

impl Deref for ChannelGuard<'_> {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        self.channel
    }
}

impl DerefMut for ChannelGuard<'_> {
    fn deref_mut(&mut self) -> &mut Channel {
        self.channel
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.channel.release();
    }
}
