//! Tool registry
//!
//! Each tool declares a [`RequiredScopeSet`]. The scope gate runs before the
//! tool body, so a tool never sees a session that lacks its scopes.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use toolgate_auth::context::EXTRA_NAME;
use toolgate_auth::{AuthError, AuthenticatedSession, RequiredScopeSet};
use tracing::debug;

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Scope required by `whoami`
pub const SCOPE_WHOAMI: &str = "tool:whoami";
/// Scope required by `greet`
pub const SCOPE_GREET: &str = "tool:greet";

type ToolHandler = fn(&AuthenticatedSession, &Value) -> Result<Value, JsonRpcError>;

/// A registered tool
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    description: String,
    required: RequiredScopeSet,
    input_schema: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Declare a tool
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        required: RequiredScopeSet,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            input_schema: json!({ "type": "object" }),
            handler,
        }
    }

    /// JSON schema advertised for the tool arguments
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scopes the caller must hold
    pub fn required_scopes(&self) -> &RequiredScopeSet {
        &self.required
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
            "requiredScopes": self.required.scopes(),
        })
    }
}

/// Named tools dispatched from `tools/list` and `tools/call`
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `whoami` and `greet`
    pub fn builtin() -> Self {
        Self::new()
            .with_tool(Tool::new(
                "whoami",
                "Describe the authenticated caller",
                RequiredScopeSet::new([SCOPE_WHOAMI]),
                whoami,
            ))
            .with_tool(
                Tool::new(
                    "greet",
                    "Greet someone by name",
                    RequiredScopeSet::new([SCOPE_GREET]),
                    greet,
                )
                .with_input_schema(json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                })),
            )
    }

    /// Register a tool, replacing any tool of the same name
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    /// Look up a tool
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Handle one JSON-RPC request for an authenticated session
    ///
    /// Protocol-level problems come back as JSON-RPC error responses.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ScopeDenied`] when the session lacks a scope the
    /// called tool requires; the caller answers that with 403.
    pub fn dispatch(
        &self,
        session: &AuthenticatedSession,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, AuthError> {
        let id = request.id;
        let outcome = match request.method.as_str() {
            "tools/list" => Ok(self.list()),
            "tools/call" => self.call(session, request.params.as_ref())?,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Ok(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn list(&self) -> Value {
        json!({ "tools": self.tools.values().map(Tool::describe).collect::<Vec<_>>() })
    }

    fn call(
        &self,
        session: &AuthenticatedSession,
        params: Option<&Value>,
    ) -> Result<Result<Value, JsonRpcError>, AuthError> {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return Ok(Err(JsonRpcError::invalid_params("missing tool name")));
        };
        let Some(tool) = self.tools.get(name) else {
            return Ok(Err(JsonRpcError::invalid_params(&format!("unknown tool '{name}'"))));
        };

        tool.required.enforce(session)?;

        let arguments = params
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        debug!(tool = %name, client_id = %session.client_id(), "Calling tool");
        Ok((tool.handler)(session, &arguments))
    }
}

fn text_result(text: impl Into<String>) -> Value {
    json!({ "content": [{ "type": "text", "text": text.into() }] })
}

fn whoami(session: &AuthenticatedSession, _arguments: &Value) -> Result<Value, JsonRpcError> {
    let summary = serde_json::to_value(session.summary())
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
    let mut result = text_result(summary.to_string());
    result["structuredContent"] = summary;
    Ok(result)
}

fn greet(session: &AuthenticatedSession, arguments: &Value) -> Result<Value, JsonRpcError> {
    let name = match arguments.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name.trim()).filter(|n| !n.is_empty()),
        Some(_) => return Err(JsonRpcError::invalid_params("'name' must be a string")),
    };
    let name = name
        .or_else(|| session.attribute(EXTRA_NAME))
        .unwrap_or("there");
    Ok(text_result(format!("Hello, {name}!")))
}
