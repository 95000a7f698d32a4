//! Tool trait and registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A capability module the router can dispatch to.
///
/// Tools never fail across this boundary: any problem is reported in the
/// returned text, which the control loop inspects for failure markers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name (`executor`, `file_manager`, ...)
    fn name(&self) -> &str;

    /// Human-readable description, offered to the backend as a skill note
    fn description(&self) -> &str;

    /// JSON Schema for the flat parameter object, if the tool wants validation
    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    /// Run the tool for an action of wire kind `kind`.
    async fn invoke(&self, kind: &str, sub_action: Option<&str>, params: &Map<String, Value>)
    -> String;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Tools by name, with their parameter validators compiled once.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: BoxedTool) {
        let name = tool.name().to_string();
        self.schema_cache.remove(&name);
        if let Some(schema) = tool.parameters_schema() {
            match jsonschema::validator_for(&schema) {
                Ok(validator) => {
                    self.schema_cache.insert(name.clone(), Arc::new(validator));
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid tool parameter schema for '{}', skipping validation: {}",
                        name,
                        e
                    );
                }
            }
        }
        self.tools.insert(name, tool);
    }

    pub fn with(mut self, tool: BoxedTool) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One line per tool, for the generator's context note.
    pub fn describe(&self) -> String {
        self.names()
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns `Some(error_message)` if `params` violate the tool's schema.
    pub fn validate(&self, name: &str, params: &Map<String, Value>) -> Option<String> {
        let validator = self.schema_cache.get(name)?;
        validate_with_validator(&Value::Object(params.clone()), validator)
    }
}

/// Validate tool arguments using a pre-compiled validator.
fn validate_with_validator(args: &Value, validator: &jsonschema::Validator) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> Option<Value> {
            Some(json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "count": { "type": "integer" }
                },
                "required": ["text"]
            }))
        }
        async fn invoke(
            &self,
            _kind: &str,
            _sub_action: Option<&str>,
            params: &Map<String, Value>,
        ) -> String {
            params
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)")
                .to_string()
        }
    }

    struct BadSchemaTool;

    #[async_trait]
    impl Tool for BadSchemaTool {
        fn name(&self) -> &str {
            "bad"
        }
        fn description(&self) -> &str {
            "Has a broken schema"
        }
        fn parameters_schema(&self) -> Option<Value> {
            Some(json!({"type": "not_a_real_type"}))
        }
        async fn invoke(&self, _: &str, _: Option<&str>, _: &Map<String, Value>) -> String {
            "ok".into()
        }
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_invoke() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool));
        let tool = registry.get("echo").unwrap();
        let out = tool.invoke("echo_op", None, &obj(json!({"text": "hello"}))).await;
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_validate_valid() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool));
        assert!(registry.validate("echo", &obj(json!({"text": "a", "count": 2}))).is_none());
    }

    #[test]
    fn test_validate_missing_required() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool));
        let msg = registry.validate("echo", &obj(json!({"count": 5}))).unwrap();
        assert!(msg.contains("validation failed"), "got: {}", msg);
        assert!(msg.contains("text"), "should mention missing field, got: {}", msg);
    }

    #[test]
    fn test_validate_wrong_type() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool));
        let msg = registry.validate("echo", &obj(json!({"text": 123}))).unwrap();
        assert!(msg.contains("/text"), "got: {}", msg);
    }

    #[test]
    fn test_invalid_schema_skips_validation() {
        let registry = ToolRegistry::new().with(Arc::new(BadSchemaTool));
        assert!(registry.validate("bad", &obj(json!({"anything": true}))).is_none());
        assert!(registry.get("bad").is_some());
    }

    #[test]
    fn test_names_and_describe() {
        let registry = ToolRegistry::new()
            .with(Arc::new(EchoTool))
            .with(Arc::new(BadSchemaTool));
        assert_eq!(registry.names(), vec!["bad", "echo"]);
        assert!(registry.describe().contains("- echo: Echoes input"));
    }
}
