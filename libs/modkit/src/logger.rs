//! Logger interface the kernel expects from its host (§6.5).
//!
//! The kernel never constructs its own logger unless the host skips it;
//! [`crate::app::Application::with_logger`] lets the host pass its own.
//! [`TracingLogger`] is the default implementation, a thin adapter over the
//! `tracing` crate matching how every module in the pack this kernel is
//! modeled on actually logs.

use std::sync::Arc;

/// Structured key-value logging surface, safe for concurrent use.
///
/// Implementations must never be `nil`/absent from the facade's point of
/// view — `Application::logger()` always returns one.
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]);
    fn info(&self, msg: &str, fields: &[(&str, &str)]);
    fn warn(&self, msg: &str, fields: &[(&str, &str)]);
    fn error(&self, msg: &str, fields: &[(&str, &str)]);

    /// Return a child logger with the given key-value pairs bound to every
    /// subsequent call.
    fn with(&self, fields: &[(&str, &str)]) -> Arc<dyn Logger>;
}

/// Default [`Logger`] backed by `tracing`. Bound fields are rendered as a
/// single pre-formatted suffix since `tracing`'s structured fields must be
/// static/known at the callsite; this keeps the adapter dependency-light
/// while still surfacing the bound context.
#[derive(Clone, Default)]
pub struct TracingLogger {
    bound: Vec<(String, String)>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&self, msg: &str, fields: &[(&str, &str)]) -> String {
        if self.bound.is_empty() && fields.is_empty() {
            return msg.to_string();
        }
        let mut out = String::from(msg);
        for (k, v) in &self.bound {
            out.push_str(&format!(" {k}={v}"));
        }
        for (k, v) in fields {
            out.push_str(&format!(" {k}={v}"));
        }
        out
    }
}

impl Logger for TracingLogger {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::debug!("{}", self.render(msg, fields));
    }

    fn info(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::info!("{}", self.render(msg, fields));
    }

    fn warn(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::warn!("{}", self.render(msg, fields));
    }

    fn error(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::error!("{}", self.render(msg, fields));
    }

    fn with(&self, fields: &[(&str, &str)]) -> Arc<dyn Logger> {
        let mut bound = self.bound.clone();
        bound.extend(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Arc::new(TracingLogger { bound })
    }
}
