//! `{name}` placeholder substitution for stored prompt templates.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Substitution variables passed to prompt resolution.
pub type PromptVars = Map<String, Value>;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}|\{|\}").expect("valid template regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("missing template variable '{0}'")]
    MissingPlaceholder(String),
    #[error("unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
}

/// Fill `{name}` placeholders from `vars`. `{{` and `}}` produce literal
/// braces. String values are inserted verbatim; other values as JSON text.
pub fn render(template: &str, vars: &PromptVars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN.captures_iter(template) {
        let Some(token) = caps.get(0) else { continue };
        out.push_str(&template[last..token.start()]);
        last = token.end();

        match token.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => return Err(TemplateError::UnbalancedBrace(token.start())),
            _ => {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                match vars.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => return Err(TemplateError::MissingPlaceholder(name.to_string())),
                }
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> PromptVars {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn substitutes_named_placeholders() {
        let out = render(
            "Install {color} screens with {mesh_type} mesh.",
            &vars(json!({"color": "Bronze", "mesh_type": "12x12"})),
        )
        .unwrap();
        assert_eq!(out, "Install Bronze screens with 12x12 mesh.");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("No variables here.", &PromptVars::new()).unwrap(), "No variables here.");
    }

    #[test]
    fn escaped_braces_are_literal() {
        let out = render(r#"Return {{"score": {n}}}"#, &vars(json!({"n": 1}))).unwrap();
        assert_eq!(out, r#"Return {"score": 1}"#);
    }

    #[test]
    fn missing_variable_is_reported() {
        let err = render("Hello {customer_name}", &PromptVars::new()).unwrap_err();
        assert_eq!(err, TemplateError::MissingPlaceholder("customer_name".into()));
    }

    #[test]
    fn stray_brace_is_reported() {
        assert!(matches!(
            render("broken { template", &PromptVars::new()),
            Err(TemplateError::UnbalancedBrace(7))
        ));
    }
}
