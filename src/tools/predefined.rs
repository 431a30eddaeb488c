//! In-process tool callbacks: `stdin-prompt` and `template-format`.

use anyhow::{Context, Result};

use super::ToolArgs;
use crate::permissions::Operator;

/// Renders `args` through a minijinja template, or pretty JSON without one.
pub fn render_template(template: Option<&str>, args: &ToolArgs) -> Result<String> {
    match template {
        Some(source) => {
            let env = minijinja::Environment::new();
            env.render_str(source, args.as_map())
                .context("Failed to render tool template")
        }
        None => serde_json::to_string_pretty(args.as_map())
            .context("Failed to encode tool arguments"),
    }
}

/// Asks the operator for one line. The `prompt` argument, when present, is
/// shown as the question.
pub async fn stdin_prompt(operator: &dyn Operator, name: &str, args: &ToolArgs) -> Result<String> {
    let question = args
        .get("prompt")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("[{}] >", name));
    operator.read_line(&question).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArgs {
        ToolArgs::from_value(value).unwrap()
    }

    #[test]
    fn test_template_uses_arguments_as_context() {
        let rendered = render_template(
            Some("Hello {{ name }}, you are {{ age }}"),
            &args(json!({"name": "Ada", "age": 36})),
        )
        .unwrap();
        assert_eq!(rendered, "Hello Ada, you are 36");
    }

    #[test]
    fn test_template_can_iterate_arrays() {
        let rendered = render_template(
            Some("{% for i in items %}[{{ i }}]{% endfor %}"),
            &args(json!({"items": [1, 2, 3]})),
        )
        .unwrap();
        assert_eq!(rendered, "[1][2][3]");
    }

    #[test]
    fn test_without_template_pretty_prints() {
        let rendered = render_template(None, &args(json!({"a": 1}))).unwrap();
        assert_eq!(rendered, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_broken_template_is_an_error() {
        assert!(render_template(Some("{{ unclosed"), &args(json!({}))).is_err());
    }
}
