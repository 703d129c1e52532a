//! Tenant prompt capability set.

use homeviz_shared::{ProductOptions, Scope};

/// Edit sent when a result fails the quality gate, unless the tenant has its own.
pub const DEFAULT_REFINE_PROMPT: &str = "The previous installation was not perfect. Please refine the screens. Ensure they are fully covering the openings and the texture is realistic.";

/// Prompts for a vision-gated structural build-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralPrompts {
    /// YES/NO question put to the vision model about the cleaned image.
    pub question: String,
    /// Edit applied when the answer is YES.
    pub build_out: String,
}

/// Code-default prompts a tenant supplies to the pipeline.
///
/// Tenants declare their insertion capability through
/// `supports_insertion`; an insertion step configured for a tenant that
/// returns `false` is a configuration error.
pub trait PromptProvider: Send + Sync {
    /// Prompt for the unconditional cleanup pass.
    fn cleanup_prompt(&self) -> String;

    fn supports_insertion(&self) -> bool;

    /// Prompt inserting `feature_name` with the chosen product options.
    ///
    /// `None` when [`supports_insertion`](Self::supports_insertion) is false.
    fn insertion_prompt(&self, feature_name: &str, options: &ProductOptions) -> Option<String>;

    /// Prompt for the vision quality check, given the enabled features.
    fn quality_prompt(&self, scope: &Scope) -> String;

    /// Corrective edit applied after a failed quality check.
    fn refine_prompt(&self) -> String {
        DEFAULT_REFINE_PROMPT.to_string()
    }

    /// Structural build-out prompts; `None` when the tenant has no such step.
    fn structural_prompts(&self) -> Option<StructuralPrompts> {
        None
    }
}

/// `"dark_bronze"` → `"Dark Bronze"`.
pub fn display_value(value: &str) -> String {
    value
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Option value for `key`, or `default` when unset.
pub(crate) fn option_or<'a>(options: &'a ProductOptions, key: &str, default: &'a str) -> &'a str {
    options.get(key).map(String::as_str).unwrap_or(default)
}

/// Enabled scope keys joined for display, e.g. `"doors, patio"`.
pub(crate) fn enabled_features(scope: &Scope) -> String {
    let enabled: Vec<&str> = scope
        .iter()
        .filter(|(_, on)| **on)
        .map(|(k, _)| k.as_str())
        .collect();
    if enabled.is_empty() {
        "none".to_string()
    } else {
        enabled.join(", ")
    }
}

/// JSON response contract shared by every tenant quality prompt.
pub(crate) const QUALITY_JSON_CONTRACT: &str = r#"Return ONLY a JSON object:
{
    "score": float,
    "reason": "string"
}"#;
