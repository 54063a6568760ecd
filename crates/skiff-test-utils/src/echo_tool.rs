// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A side-effect-free tool for exercising the tool loop.

use async_trait::async_trait;
use serde_json::{Value, json};
use skiff_core::SkiffError;
use skiff_tools::{Tool, ToolContext, ToolOutput};

/// `echo`: returns its `text` argument unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn invoke(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput, SkiffError> {
        Ok(ToolOutput::ok(input["text"].as_str().unwrap_or_default()))
    }
}
