//! Core domain types shared by the tenant, storage, and pipeline crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feature key → enabled. Decides which optional insertion steps run.
pub type Scope = BTreeMap<String, bool>;

/// Product option values chosen by the end user (e.g. `roof_color = "black"`).
pub type ProductOptions = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// StepType
// ---------------------------------------------------------------------------

/// Step-type tag used to select a handler from the step registry.
///
/// The set is open: tenants may declare custom tags that are bound to
/// handlers registered at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Cleanup,
    Insertion,
    /// Vision-gated structural build-out ahead of the insertions.
    StructuralPrep,
    QualityCheck,
    Custom(String),
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Insertion => "insertion",
            Self::StructuralPrep => "structural_prep",
            Self::QualityCheck => "quality_check",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for StepType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "cleanup" => Self::Cleanup,
            "insertion" => Self::Insertion,
            "structural_prep" => Self::StructuralPrep,
            "quality_check" => Self::QualityCheck,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for StepType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        step_type.as_str().to_string()
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepConfig
// ---------------------------------------------------------------------------

/// Configuration record for one named pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Handler tag. A step without one cannot be dispatched.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    /// Feature passed to the tenant insertion prompt (defaults to the step name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_name: Option<String>,
    /// Scope flag gating an insertion step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_key: Option<String>,
    /// Progress percentage (0–100) reported when the step starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_weight: Option<u8>,
    /// Human-readable progress message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StepConfig {
    /// Shorthand for a typed step with a progress label.
    pub fn new(step_type: StepType, description: &str, progress_weight: u8) -> Self {
        Self {
            step_type: Some(step_type),
            description: Some(description.to_string()),
            progress_weight: Some(progress_weight),
            ..Self::default()
        }
    }

    /// Builder-style setter for an insertion step's feature and scope.
    pub fn with_feature(mut self, feature_name: &str, scope_key: &str) -> Self {
        self.feature_name = Some(feature_name.to_string());
        self.scope_key = Some(scope_key.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Product schema
// ---------------------------------------------------------------------------

/// A selectable value in a product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    pub value: String,
    pub label: String,
}

/// One category of the tenant's product form (e.g. "Mesh Type").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub key: String,
    pub label: String,
    /// Form input type, e.g. `select`.
    #[serde(rename = "type")]
    pub input_type: String,
    pub required: bool,
    pub options: Vec<ProductOption>,
}

// ---------------------------------------------------------------------------
// PromptOverride
// ---------------------------------------------------------------------------

/// One stored version of a tenant's prompt for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOverride {
    /// UUID v7.
    pub id: String,
    pub tenant_id: String,
    pub step_name: String,
    /// Starts at 1 and increases per `(tenant_id, step_name)`.
    pub version: u32,
    /// Template with named `{placeholders}`.
    pub prompt_text: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_type_tags() {
        assert_eq!(StepType::from("cleanup"), StepType::Cleanup);
        assert_eq!(StepType::from("quality_check"), StepType::QualityCheck);
        assert_eq!(StepType::from("structural_prep"), StepType::StructuralPrep);
        assert_eq!(
            StepType::from("sky_replace"),
            StepType::Custom("sky_replace".into())
        );
        assert_eq!(StepType::Insertion.to_string(), "insertion");
    }

    #[test]
    fn step_config_reads_type_field() {
        let json = r#"{
            "type": "insertion",
            "feature_name": "entry doors",
            "scope_key": "doors",
            "progress_weight": 70,
            "description": "Building Doors"
        }"#;
        let config: StepConfig = serde_json::from_str(json).expect("parse step config");
        assert_eq!(config.step_type, Some(StepType::Insertion));
        assert_eq!(config.scope_key.as_deref(), Some("doors"));
        assert_eq!(config.progress_weight, Some(70));
    }

    #[test]
    fn step_config_without_type() {
        let config: StepConfig = serde_json::from_str("{}").expect("parse empty");
        assert!(config.step_type.is_none());
        let back = serde_json::to_string(&config).expect("serialize");
        assert_eq!(back, "{}");
    }

    #[test]
    fn product_category_uses_type_key() {
        let json = r#"{
            "key": "roof_color",
            "label": "Roof Color",
            "type": "select",
            "required": true,
            "options": [{"value": "black", "label": "Black"}]
        }"#;
        let category: ProductCategory = serde_json::from_str(json).expect("parse");
        assert_eq!(category.input_type, "select");
        assert_eq!(category.options[0].value, "black");
    }
}
