//! Terminal sinks, local and proxied.

mod proxy;
mod sink;

pub use proxy::{kinds, ProxySink, SinkMessage, TerminalSinkManager};
pub use sink::{Severity, SinkCapabilities, StdioSink, Terminal, TerminalSink};
