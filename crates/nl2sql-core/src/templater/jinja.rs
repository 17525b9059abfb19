//! MiniJinja wrapper for template rendering.

use super::error::TemplateError;
use minijinja::{Environment, Value};
use std::collections::HashMap;

/// Recursion limit for template rendering, set well below MiniJinja's
/// default (500) — prompt templates are shallow by construction.
const RECURSION_LIMIT: usize = 50;

/// Renders a Jinja2 template with the given context.
///
/// Strict undefined-variable behavior: a missing context key is a rendering
/// error rather than an empty string, so a Prompt Assembler bug surfaces
/// immediately instead of silently omitting a section.
pub(crate) fn render_jinja(
    template: &str,
    context: &HashMap<String, serde_json::Value>,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
    env.set_recursion_limit(RECURSION_LIMIT);
    env.add_template("prompt", template)?;

    let ctx = Value::from_serialize(context);
    let tmpl = env.get_template("prompt")?;
    Ok(tmpl.render(ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_simple_variable() {
        let mut ctx = HashMap::new();
        ctx.insert("table_name".to_string(), serde_json::json!("users"));

        let result = render_jinja("SELECT * FROM {{ table_name }}", &ctx).unwrap();
        assert_eq!(result, "SELECT * FROM users");
    }

    #[test]
    fn renders_conditional() {
        let mut ctx = HashMap::new();
        ctx.insert("has_rag".to_string(), serde_json::json!(true));

        let template = r#"{% if has_rag %}RAG present{% endif %}"#;
        let result = render_jinja(template, &ctx).unwrap();
        assert_eq!(result, "RAG present");
    }

    #[test]
    fn renders_loop() {
        let mut ctx = HashMap::new();
        ctx.insert("columns".to_string(), serde_json::json!(["id", "name", "email"]));

        let template = r#"{% for col in columns %}{{ col }}{% if not loop.last %}, {% endif %}{% endfor %}"#;
        let result = render_jinja(template, &ctx).unwrap();
        assert_eq!(result, "id, name, email");
    }

    #[test]
    fn errors_on_undefined_variable_in_strict_mode() {
        let ctx = HashMap::new();
        let result = render_jinja("{{ undefined_value }}", &ctx);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), TemplateError::UndefinedVariable(_)));
    }

    #[test]
    fn errors_on_syntax_error() {
        let ctx = HashMap::new();
        let result = render_jinja("{{ unclosed", &ctx);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), TemplateError::SyntaxError(_)));
    }
}
