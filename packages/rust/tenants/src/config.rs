//! Tenant configuration record: product schema and pipeline layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use homeviz_shared::{HomeVizError, ProductCategory, Result, StepConfig, StepType};

/// Per-tenant product schema and ordered pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Unique, immutable tenant identifier (e.g. `roofs`).
    pub tenant_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Product form categories, in display order.
    pub product_schema: Vec<ProductCategory>,
    /// Step names in execution order.
    pub pipeline_steps: Vec<String>,
    /// Step name → step configuration.
    pub step_configs: BTreeMap<String, StepConfig>,
}

impl TenantConfig {
    /// Configuration for a named step, if the tenant defines it.
    pub fn step_config(&self, step_name: &str) -> Option<&StepConfig> {
        self.step_configs.get(step_name)
    }

    /// `(value, label)` pairs of a product category; empty if the key is unknown.
    pub fn options_for_category(&self, category_key: &str) -> Vec<(String, String)> {
        self.product_schema
            .iter()
            .find(|c| c.key == category_key)
            .map(|c| {
                c.options
                    .iter()
                    .map(|o| (o.value.clone(), o.label.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ordered `(step_name, config)` pairs.
    ///
    /// Fails if a listed step has no configuration.
    pub fn ordered_steps(&self) -> Result<Vec<(&str, &StepConfig)>> {
        self.pipeline_steps
            .iter()
            .map(|name| {
                self.step_config(name)
                    .map(|config| (name.as_str(), config))
                    .ok_or_else(|| {
                        HomeVizError::config(format!(
                            "tenant '{}' lists step '{name}' without a step configuration",
                            self.tenant_id
                        ))
                    })
            })
            .collect()
    }

    /// Check the step-config invariant and warn about convention deviations.
    ///
    /// A first step other than cleanup or a last step other than quality
    /// check is logged, not rejected.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(HomeVizError::validation("tenant_id must not be empty"));
        }

        let steps = self.ordered_steps()?;

        if let Some(weight) = self
            .step_configs
            .values()
            .filter_map(|c| c.progress_weight)
            .find(|w| *w > 100)
        {
            return Err(HomeVizError::validation(format!(
                "tenant '{}' has progress weight {weight} outside 0-100",
                self.tenant_id
            )));
        }

        let first = steps.first().and_then(|(_, c)| c.step_type.as_ref());
        if first != Some(&StepType::Cleanup) {
            warn!(tenant = %self.tenant_id, "first pipeline step is not a cleanup step");
        }
        let last = steps.last().and_then(|(_, c)| c.step_type.as_ref());
        if last != Some(&StepType::QualityCheck) {
            warn!(tenant = %self.tenant_id, "last pipeline step is not a quality check");
        }

        Ok(())
    }
}

/// Build a `select` product category from `(value, label)` pairs.
pub(crate) fn select(
    key: &str,
    label: &str,
    required: bool,
    options: &[(&str, &str)],
) -> ProductCategory {
    ProductCategory {
        key: key.to_string(),
        label: label.to_string(),
        input_type: "select".to_string(),
        required,
        options: options
            .iter()
            .map(|(value, label)| homeviz_shared::ProductOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}
