//! # Console Logger
//!
//! Backend for the `log` facade. Records are rendered as
//! `[LEVEL] target: message` lines into a fixed buffer and handed to a
//! byte sink registered at boot (ITM stimulus port 0 on the firmware).
//! Lines longer than the buffer are cut short; nothing is allocated.

use core::fmt::{self, Write};

use heapless::String;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::sync::Global;

/// Longest rendered line, newline included.
pub const LINE_CAPACITY: usize = 128;

/// Best-effort byte output. May block.
pub type Sink = fn(&[u8]);

pub type Line = String<LINE_CAPACITY>;

static SINK: Global<Sink> = Global::new();
static LOGGER: ConsoleLogger = ConsoleLogger;

/// Install the console as the global logger.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    SINK.init(sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Write raw bytes to the console, bypassing the logger.
pub fn write_bytes(bytes: &[u8]) {
    if let Some(sink) = SINK.with(|sink| *sink) {
        sink(bytes);
    }
}

pub struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        write_bytes(format_record(record).as_bytes());
    }

    fn flush(&self) {}
}

/// Writer that keeps what fits and silently drops the rest, leaving one
/// byte free for the newline.
struct Truncating<'b> {
    line: &'b mut Line,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.line.len() + ch.len_utf8() >= LINE_CAPACITY {
                break;
            }
            // Capacity checked above
            let _ = self.line.push(ch);
        }
        Ok(())
    }
}

/// Render `record` as one newline-terminated console line.
pub fn format_record(record: &Record<'_>) -> Line {
    let mut line = Line::new();
    let _ = write!(
        Truncating { line: &mut line },
        "[{}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    );
    let _ = line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

    fn capture(bytes: &[u8]) {
        CAPTURED.lock().unwrap().extend_from_slice(bytes);
    }

    #[test]
    fn test_line_format() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("task '{}' created", "blinky"))
                .level(Level::Info)
                .target("tickos::scheduler")
                .build(),
        );
        assert_eq!(line.as_str(), "[INFO] tickos::scheduler: task 'blinky' created\n");
    }

    #[test]
    fn test_long_line_is_truncated() {
        let long = "x".repeat(LINE_CAPACITY * 2);
        let line = format_record(
            &Record::builder()
                .args(format_args!("{}", long))
                .level(Level::Warn)
                .target("t")
                .build(),
        );
        assert_eq!(line.len(), LINE_CAPACITY);
        assert!(line.starts_with("[WARN] t: xxx"));
        assert!(line.ends_with("x\n"));
    }

    #[test]
    fn test_logger_writes_to_sink() {
        SINK.init(capture);
        log::set_max_level(LevelFilter::Trace);

        ConsoleLogger.log(
            &Record::builder()
                .args(format_args!("tick 1000"))
                .level(Level::Trace)
                .target("tickos::scheduler")
                .build(),
        );
        let captured = std::string::String::from_utf8(CAPTURED.lock().unwrap().clone()).unwrap();
        assert!(captured.contains("[TRACE] tickos::scheduler: tick 1000\n"));
    }
}
