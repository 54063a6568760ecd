// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool registry: lookup, schema validation, and fault-contained execution.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use skiff_config::model::ToolsConfig;
use skiff_core::{SkiffError, ToolCall, ToolErrorKind, ToolResult};
use tracing::{debug, info, warn};

use crate::tool::{Tool, ToolContext};

#[derive(Clone)]
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Arc<jsonschema::Validator>,
}

/// Registry of available tools, indexed by name.
///
/// Built mutably at startup, then wrapped in an `Arc` and only read.
/// [`ToolRegistry::execute`] never returns an error and never lets a tool
/// panic escape: every failure becomes a [`ToolResult`] with an error kind.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Creates an empty registry with the given per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    /// Registers a tool under its `name()`.
    ///
    /// Fails on a duplicate name or a parameter schema that does not compile.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), SkiffError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(SkiffError::Config(format!(
                "tool `{name}` is already registered"
            )));
        }
        let schema = tool.parameters_schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            SkiffError::Config(format!("tool `{name}` has an invalid parameter schema: {e}"))
        })?;
        debug!(tool = %name, side_effect = %tool.side_effect(), "tool registered");
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                validator: Arc::new(validator),
            },
        );
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns (name, description) pairs for all registered tools, sorted by name.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|entry| (entry.tool.name(), entry.tool.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// Tool definitions for a provider request, sorted by name.
    ///
    /// Each definition has the shape
    /// `{"name": ..., "description": ..., "input_schema": {...}}`; adapters
    /// translate it to their wire format.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        self.list()
            .into_iter()
            .filter_map(|(name, _)| self.tools.get(name))
            .map(|entry| {
                serde_json::json!({
                    "name": entry.tool.name(),
                    "description": entry.tool.description(),
                    "input_schema": entry.tool.parameters_schema(),
                })
            })
            .collect()
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A view containing only the tools `keep` accepts. Tools are shared, not copied.
    pub fn restricted(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect(),
            timeout: self.timeout,
        }
    }

    /// A view without the named tools.
    pub fn without(&self, excluded: &[&str]) -> Self {
        self.restricted(|name| !excluded.contains(&name))
    }

    /// Validates and runs one tool call.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(entry) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "unknown tool requested");
            return ToolResult::failed(
                call,
                ToolErrorKind::UnknownTool,
                format!(
                    "Error: unknown tool `{}`. Available tools: {}",
                    call.name,
                    self.names().join(", ")
                ),
            );
        };

        // Models often send `null` for tools without parameters.
        let input = match &call.arguments {
            serde_json::Value::Null => serde_json::json!({}),
            other => other.clone(),
        };
        if let Err(problems) = validate(&entry.validator, &input) {
            warn!(tool = %call.name, call_id = %call.id, %problems, "tool arguments rejected");
            return ToolResult::failed(
                call,
                ToolErrorKind::InvalidArgs,
                format!("Error: invalid arguments for `{}`: {problems}", call.name),
            );
        }

        info!(
            tool = %call.name,
            call_id = %call.id,
            side_effect = %entry.tool.side_effect(),
            session_key = %ctx.session_key,
            "executing tool"
        );

        let invocation = AssertUnwindSafe(entry.tool.invoke(input, ctx)).catch_unwind();
        match tokio::time::timeout(self.timeout, invocation).await {
            Err(_) => {
                warn!(tool = %call.name, timeout = ?self.timeout, "tool timed out");
                ToolResult::failed(
                    call,
                    ToolErrorKind::Timeout,
                    format!(
                        "Error: tool `{}` did not finish within {}s",
                        call.name,
                        self.timeout.as_secs_f64()
                    ),
                )
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %call.name, %reason, "tool panicked");
                ToolResult::failed(
                    call,
                    ToolErrorKind::ExecutionFailed,
                    format!("Error: tool `{}` crashed: {reason}", call.name),
                )
            }
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolResult::failed(call, ToolErrorKind::ExecutionFailed, format!("Error: {e}"))
            }
            Ok(Ok(Ok(output))) if output.is_error => {
                ToolResult::failed(call, ToolErrorKind::ExecutionFailed, output.content)
            }
            Ok(Ok(Ok(output))) => ToolResult::ok(call, output.content),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// Checks `input` against the compiled schema; on failure returns every
/// violation joined into one line.
fn validate(validator: &jsonschema::Validator, input: &serde_json::Value) -> Result<(), String> {
    if !input.is_object() {
        return Err(format!("expected a JSON object, got {}", json_type(input)));
    }
    let problems: Vec<String> = validator
        .iter_errors(input)
        .map(|err| {
            let path = err.instance_path.to_string();
            if path.is_empty() {
                err.to_string()
            } else {
                format!("{path}: {err}")
            }
        })
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{SideEffect, ToolOutput};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the input back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "times": { "type": "integer", "minimum": 1 }
                },
                "required": ["text"]
            })
        }

        async fn invoke(
            &self,
            input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, SkiffError> {
            let text = input["text"].as_str().unwrap_or_default();
            let times = input["times"].as_u64().unwrap_or(1) as usize;
            Ok(ToolOutput::ok(text.repeat(times)))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panic"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::Process
        }

        async fn invoke(
            &self,
            _input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, SkiffError> {
            panic!("boom");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps for an hour"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn invoke(
            &self,
            _input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, SkiffError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::ok("late"))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Returns an error"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn invoke(
            &self,
            _input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, SkiffError> {
            Err(SkiffError::tool("disk full"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(EchoTool)).unwrap();
        registry.register(Arc::new(PanicTool)).unwrap();
        registry.register(Arc::new(SlowTool)).unwrap();
        registry.register(Arc::new(FailingTool)).unwrap();
        registry
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("cli", "direct")
    }

    #[tokio::test]
    async fn valid_call_succeeds() {
        let result = registry()
            .execute(&call("echo", serde_json::json!({"text": "ab", "times": 2})), &ctx())
            .await;
        assert!(!result.is_error());
        assert_eq!(result.content, "abab");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let result = registry()
            .execute(&call("nope", serde_json::json!({})), &ctx())
            .await;
        assert_eq!(result.error, Some(ToolErrorKind::UnknownTool));
        assert!(result.content.contains("echo"));
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_the_executor() {
        let registry = registry();
        let cases = [
            serde_json::json!({}),
            serde_json::json!({"text": 5}),
            serde_json::json!({"text": "x", "times": "two"}),
            serde_json::json!({"text": "x", "times": 0}),
            serde_json::json!(null),
            serde_json::json!("text"),
            serde_json::json!([1, 2, 3]),
        ];
        for args in cases {
            let result = registry.execute(&call("echo", args.clone()), &ctx()).await;
            assert_eq!(
                result.error,
                Some(ToolErrorKind::InvalidArgs),
                "args {args} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn null_arguments_accepted_for_parameterless_tool() {
        let result = registry()
            .execute(&call("fail", serde_json::Value::Null), &ctx())
            .await;
        // Reaches the executor, which then fails on its own terms.
        assert_eq!(result.error, Some(ToolErrorKind::ExecutionFailed));
        assert!(result.content.contains("disk full"));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let result = registry()
            .execute(&call("panic", serde_json::json!({})), &ctx())
            .await;
        assert_eq!(result.error, Some(ToolErrorKind::ExecutionFailed));
        assert!(result.content.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let result = registry()
            .execute(&call("slow", serde_json::json!({})), &ctx())
            .await;
        assert_eq!(result.error, Some(ToolErrorKind::Timeout));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_schema_is_rejected() {
        struct BadSchema;

        #[async_trait]
        impl Tool for BadSchema {
            fn name(&self) -> &str {
                "bad"
            }
            fn description(&self) -> &str {
                "Broken schema"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({ "type": "no-such-type" })
            }
            async fn invoke(
                &self,
                _input: serde_json::Value,
                _ctx: &ToolContext,
            ) -> Result<ToolOutput, SkiffError> {
                Ok(ToolOutput::ok(""))
            }
        }

        let mut registry = ToolRegistry::default();
        assert!(registry.register(Arc::new(BadSchema)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn definitions_are_sorted() {
        let defs = registry().tool_definitions();
        let names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(names, vec!["echo", "fail", "panic", "slow"]);
        assert!(defs[0]["input_schema"]["properties"]["text"].is_object());
    }

    #[test]
    fn restricted_view_shares_tools() {
        let base = registry();
        let view = base.without(&["panic", "slow"]);
        assert_eq!(view.names(), vec!["echo", "fail"]);
        assert_eq!(base.len(), 4);
        assert!(Arc::ptr_eq(
            &base.get("echo").unwrap(),
            &view.get("echo").unwrap()
        ));
    }
}
