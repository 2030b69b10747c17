//! `tracing` output routed into X-Plane's `Log.txt`.
//!
//! The plugin has no stdout worth writing to, so the fmt subscriber is given
//! a writer that hands each formatted event to a line sink. In production
//! that sink is `XPLMDebugString`.

use std::io;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Receives one formatted event at a time. Must not block.
pub type LineSink = fn(&str);

#[derive(Clone, Copy)]
pub struct XplmLogWriter {
    sink: LineSink,
}

impl XplmLogWriter {
    pub fn new(sink: LineSink) -> Self {
        XplmLogWriter { sink }
    }
}

impl io::Write for XplmLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // XPLMDebugString takes a C string; interior NULs would truncate it.
        let text: String = String::from_utf8_lossy(buf)
            .chars()
            .map(|c| if c == '\0' { ' ' } else { c })
            .collect();
        (self.sink)(&text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for XplmLogWriter {
    type Writer = XplmLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// A second call (plugin reloaded in the same process) is a no-op.
pub fn init(sink: LineSink) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(XplmLogWriter::new(sink))
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .try_init();
}
