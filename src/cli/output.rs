//! Colored terminal output for the release bot.

use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Consistent colored output for the CLI front door.
///
/// Write failures are swallowed; losing a status line must never abort
/// a release workflow.
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
}

impl OutputManager {
    /// Create an output manager writing to stdout/stderr.
    pub fn new() -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
        }
    }

    /// Print a plain line.
    pub fn println(&self, message: &str) {
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer, "{message}");
        let _ = self.stdout.print(&buffer);
    }

    /// Print an informational message.
    pub fn info(&self, message: &str) {
        self.tagged(Color::Cyan, "ℹ", message);
    }

    /// Print a success message.
    pub fn success(&self, message: &str) {
        self.tagged(Color::Green, "✓", message);
    }

    /// Print a warning.
    pub fn warn(&self, message: &str) {
        self.tagged(Color::Yellow, "⚠", message);
    }

    /// Print an error to stderr (always shown).
    pub fn error(&self, message: &str) {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(&mut buffer, "✗");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {message}");
        let _ = stderr.print(&buffer);
    }

    fn tagged(&self, color: Color, tag: &str, message: &str) {
        let mut buffer = self.stdout.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(&mut buffer, "{tag}");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {message}");
        let _ = self.stdout.print(&buffer);
    }
}

impl Default for OutputManager {
    fn default() -> Self {
        Self::new()
    }
}
