/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/dispatch.rs
 * Responsibility: The single entry point from the conversation loop into the actions.
 */

use crate::actions::{ActionContext, ActionError};
use crate::audit::{AuditLog, AuditRecord};
use crate::config::{Config, ToolchainConfig};
use crate::registry::Registry;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;

/// Resolves a model-named action, runs it, and always answers with a string.
///
/// `dispatch` takes `&mut self`: one call is in flight at a time and the next
/// is only considered once the previous one has returned.
pub struct Dispatcher {
    registry: Registry,
    audit: AuditLog,
    toolchain: ToolchainConfig,
    max_result_bytes: usize,
}

impl Dispatcher {
    pub fn new(registry: Registry, audit: AuditLog, toolchain: ToolchainConfig) -> Self {
        Self {
            registry,
            audit,
            toolchain,
            max_result_bytes: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Registry::standard(),
            AuditLog::new(&config.runtime.audit_log),
            config.toolchain.clone(),
        )
        .with_max_result_bytes(config.runtime.max_result_bytes)
    }

    pub fn with_max_result_bytes(mut self, limit: usize) -> Self {
        self.max_result_bytes = limit;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub async fn dispatch(
        &mut self,
        name: &str,
        arguments: &str,
        working_directory: &Path,
        allow_unsafe: bool,
        verbose: bool,
    ) -> String {
        self.audit.record(&AuditRecord {
            function: name,
            arguments,
            working_directory,
            allow_unsafe,
        });
        tracing::info!(
            function = name,
            working_directory = %working_directory.display(),
            allow_unsafe,
            "dispatching action"
        );

        if verbose {
            println!("→ Calling function: {}({})", name, arguments);
        }

        let mut args = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => return format!("ERROR: Could not parse arguments for {}: {}", name, e),
        };

        let Some(kind) = self.registry.resolve(name, allow_unsafe) else {
            tracing::warn!(function = name, allow_unsafe, "unknown or unpermitted action");
            return format!("ERROR: Unknown function: {}", name);
        };

        // The working directory comes from the session, never from the model.
        if args.remove("working_directory").is_some() {
            tracing::warn!(function = name, "ignoring model-supplied working_directory");
        }

        let call = match kind.parse(Value::Object(args)) {
            Ok(call) => call,
            Err(e) => return format!("ERROR calling the function {}: {}", name, e),
        };

        let ctx = ActionContext::new(working_directory, self.toolchain.clone());
        let outcome = AssertUnwindSafe(call.execute(&ctx)).catch_unwind().await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => render_action_error(name, &e),
            Err(panic) => {
                tracing::error!(function = name, "action panicked");
                format!("ERROR calling the function {}: {}", name, panic_message(&*panic))
            }
        };

        truncate_output(output, self.max_result_bytes)
    }
}

fn parse_arguments(arguments: &str) -> Result<Map<String, Value>, String> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

fn render_action_error(name: &str, error: &ActionError) -> String {
    tracing::debug!(function = name, "action reported: {}", error);
    format!("ERROR: {}", error)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected internal failure".to_string()
    }
}

/// Keeps the head and tail of an oversized result. A `limit` of 0 disables it.
pub(crate) fn truncate_output(output: String, limit: usize) -> String {
    if limit == 0 || output.len() <= limit {
        return output;
    }

    let mut prefix_end = limit / 2;
    while prefix_end > 0 && !output.is_char_boundary(prefix_end) {
        prefix_end -= 1;
    }

    let mut suffix_start = output.len().saturating_sub(limit / 2);
    while suffix_start < output.len() && !output.is_char_boundary(suffix_start) {
        suffix_start += 1;
    }

    format!(
        "{} ... [TRUNCATED {} bytes] ... {}",
        &output[..prefix_end],
        suffix_start - prefix_end,
        &output[suffix_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dispatcher(dir: &Path) -> Dispatcher {
        Dispatcher::new(
            Registry::standard(),
            AuditLog::new(dir.join("audit.log")),
            ToolchainConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_reported() {
        let dir = tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        let out = d.dispatch("get_files_info", "{not json", dir.path(), false, false).await;
        assert!(out.starts_with("ERROR: Could not parse arguments for get_files_info:"));

        let out = d.dispatch("get_files_info", "[1, 2]", dir.path(), false, false).await;
        assert!(out.contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn test_empty_arguments_use_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "abc").unwrap();
        let mut d = dispatcher(dir.path());

        let out = d.dispatch("get_files_info", "", dir.path(), false, false).await;
        assert!(out.contains("- a.txt: file_size=3 bytes, is_dir=false"));
    }

    #[tokio::test]
    async fn test_unknown_field_is_a_call_error() {
        let dir = tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        let out = d
            .dispatch("create_dir", r#"{"dir_path": "x", "mode": "0777"}"#, dir.path(), false, false)
            .await;
        assert!(out.starts_with("ERROR calling the function create_dir:"));
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_model_cannot_override_working_directory() {
        let root = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let mut d = dispatcher(root.path());

        let args = serde_json::json!({
            "file_path": "note.txt",
            "content": "hi",
            "working_directory": elsewhere.path(),
        })
        .to_string();
        let out = d.dispatch("write_file", &args, root.path(), false, false).await;

        assert!(out.starts_with("Successfully wrote"));
        assert!(root.path().join("note.txt").exists());
        assert!(!elsewhere.path().join("note.txt").exists());
    }

    #[test]
    fn test_truncate_output_keeps_head_and_tail() {
        let text = format!("{}{}", "a".repeat(100), "b".repeat(100));
        let out = truncate_output(text, 20);
        assert!(out.starts_with("aaaaaaaaaa ... [TRUNCATED 180 bytes] ... "));
        assert!(out.ends_with("bbbbbbbbbb"));

        assert_eq!(truncate_output("short".to_string(), 0), "short");
        assert_eq!(truncate_output("short".to_string(), 100), "short");
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unexpected internal failure");
    }
}
