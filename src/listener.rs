//! # Event listener boundary
//!
//! [`EventListener`] is the capability the embedding application hands to a
//! [`Supervisor`](crate::Supervisor). It receives every log line produced by a
//! subsystem and the two lifecycle notifications of a run.
//!
//! ## Contract
//! - Calls are **synchronous** and happen on the task that produced them; several
//!   subsystems may call `log_with_prefix` at the same time.
//! - Implementations must not block indefinitely.
//! - `after_startup` fires at most once per run, after every subsystem was spawned.
//! - `before_shutdown` fires exactly once per run, on every exit path.
//!
//! Subsystems log through a [`Logger`], a prefix bound to the listener:
//! ```text
//! scope.logger_for("proposer tx manager").info("sent tx")
//!     └─► listener.log_with_prefix("proposer tx manager", &LogRecord{ .. })
//! ```

use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::Level;

/// One log line produced by a subsystem.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Severity.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Structured key/value context.
    pub fields: Vec<(Cow<'static, str>, String)>,
    /// Wall-clock timestamp.
    pub at: SystemTime,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: Vec::new(),
            at: SystemTime::now(),
        }
    }

    /// Attaches a key/value pair.
    pub fn with_field(mut self, key: impl Into<Cow<'static, str>>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }
}

/// Callback sink for subsystem logs and run lifecycle notifications.
pub trait EventListener: Send + Sync + 'static {
    /// Called for every log line of every subsystem. `prefix` is never empty.
    fn log_with_prefix(&self, prefix: &str, record: &LogRecord);

    /// Called once, after every subsystem has been spawned.
    fn after_startup(&self);

    /// Called once, before the run's cause is finalized and returned.
    fn before_shutdown(&self);
}

/// Default listener: forwards records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn log_with_prefix(&self, prefix: &str, record: &LogRecord) {
        let fields = FieldsDisplay(&record.fields);
        match record.level {
            Level::ERROR => tracing::error!(prefix, %fields, "{}", record.message),
            Level::WARN => tracing::warn!(prefix, %fields, "{}", record.message),
            Level::INFO => tracing::info!(prefix, %fields, "{}", record.message),
            Level::DEBUG => tracing::debug!(prefix, %fields, "{}", record.message),
            _ => tracing::trace!(prefix, %fields, "{}", record.message),
        }
    }

    fn after_startup(&self) {
        tracing::info!("all subsystems started");
    }

    fn before_shutdown(&self) {
        tracing::info!("shutting down subsystems");
    }
}

struct FieldsDisplay<'a>(&'a [(Cow<'static, str>, String)]);

impl std::fmt::Display for FieldsDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Prefix-bound handle that routes log lines to an [`EventListener`].
#[derive(Clone)]
pub struct Logger {
    prefix: Arc<str>,
    listener: Arc<dyn EventListener>,
}

impl Logger {
    /// Creates a logger; an empty `prefix` is replaced by `fallback`.
    pub(crate) fn new(prefix: &str, fallback: &str, listener: Arc<dyn EventListener>) -> Self {
        let prefix = match (prefix.is_empty(), fallback.is_empty()) {
            (false, _) => prefix,
            (true, false) => fallback,
            (true, true) => "stackvisor",
        };
        Self {
            prefix: prefix.into(),
            listener,
        }
    }

    /// The prefix passed to `log_with_prefix`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Forwards a prepared record.
    pub fn log(&self, record: &LogRecord) {
        self.listener.log_with_prefix(&self.prefix, record);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(&LogRecord::new(Level::ERROR, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(&LogRecord::new(Level::WARN, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(&LogRecord::new(Level::INFO, message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(&LogRecord::new(Level::DEBUG, message));
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("prefix", &self.prefix).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<(String, Level, String)>>,
    }

    impl EventListener for Capture {
        fn log_with_prefix(&self, prefix: &str, record: &LogRecord) {
            self.lines.lock().unwrap().push((
                prefix.to_string(),
                record.level,
                record.message.clone(),
            ));
        }
        fn after_startup(&self) {}
        fn before_shutdown(&self) {}
    }

    #[test]
    fn logger_routes_with_prefix() {
        let capture = Arc::new(Capture::default());
        let log = Logger::new("batcher dialer", "batcher", capture.clone());
        log.info("dialed");
        log.error("lost connection");

        let lines = capture.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ("batcher dialer".into(), Level::INFO, "dialed".into()));
        assert_eq!(lines[1].1, Level::ERROR);
    }

    #[test]
    fn empty_prefix_never_reaches_listener() {
        let capture = Arc::new(Capture::default());
        Logger::new("", "node", capture.clone()).warn("a");
        Logger::new("", "", capture.clone()).warn("b");

        let lines = capture.lines.lock().unwrap();
        assert_eq!(lines[0].0, "node");
        assert_eq!(lines[1].0, "stackvisor");
    }

    #[test]
    fn record_fields_render_in_order() {
        let rec = LogRecord::new(Level::INFO, "m")
            .with_field("block", 12)
            .with_field("hash", "0xab");
        assert_eq!(FieldsDisplay(&rec.fields).to_string(), "block=12 hash=0xab");
    }
}
