//! Tool/function-call boundary.
//!
//! When the model finishes a function-call item, the bridge hands the call
//! to a [`ToolHandler`] and feeds the textual result back into the session.
//! The handler is synchronous and expected to be bounded; it runs on the AI
//! event loop, so a slow handler delays event processing for exactly as
//! long as the call itself takes.

use anyhow::Result;
use tracing::info;

pub trait ToolHandler: Send + Sync {
    /// Handles one function call. `arguments` is the JSON string the model
    /// accumulated; the returned string is fed back verbatim as the call
    /// output.
    fn handle(&self, name: &str, arguments: &str) -> Result<String>;
}

/// Default handler for deployments without business tools: acknowledges
/// every call so generation can resume.
pub struct NoopToolHandler;

impl ToolHandler for NoopToolHandler {
    fn handle(&self, name: &str, arguments: &str) -> Result<String> {
        info!(tool = name, arguments, "No tool handler registered; returning empty result.");
        Ok("{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_handler_returns_empty_object() {
        let result = NoopToolHandler.handle("accept_job_offer", "{\"id\":1}").unwrap();
        assert_eq!(result, "{}");
    }
}
