//! Per-run pipeline state and step results.

use image::DynamicImage;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use homeviz_shared::{ProductOptions, Scope};

use crate::quality::QualityVerdict;
use crate::template::PromptVars;

/// What a step handler produced.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// Cleanup output: becomes the working image and the clean reference.
    Cleaned(DynamicImage),
    /// Insertion output: becomes the working image.
    Transformed(DynamicImage),
    /// Quality check score and reason.
    Quality(QualityVerdict),
    /// Scope disabled; nothing changed.
    Skipped,
    /// Extension handler payload, recorded but not interpreted.
    Custom(Value),
}

/// State owned by a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineExecutionContext {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub original_image: DynamicImage,
    /// Cleanup output; the baseline for quality checks.
    pub clean_image: Option<DynamicImage>,
    pub current_image: DynamicImage,
    pub scope: Scope,
    pub options: ProductOptions,
    pub progress: u8,
    pub description: String,
    /// Last transform step whose output was applied.
    pub last_transform: Option<String>,
    pub quality: Option<QualityVerdict>,
    pub custom_results: Vec<(String, Value)>,
}

impl PipelineExecutionContext {
    pub fn new(
        tenant_id: &str,
        image: DynamicImage,
        scope: Scope,
        options: ProductOptions,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            current_image: image.clone(),
            original_image: image,
            clean_image: None,
            scope,
            options,
            progress: 0,
            description: String::new(),
            last_transform: None,
            quality: None,
            custom_results: Vec::new(),
        }
    }

    /// Quality-check baseline: the clean image, else the working image.
    pub fn reference_image(&self) -> &DynamicImage {
        self.clean_image.as_ref().unwrap_or(&self.current_image)
    }

    /// Whether an insertion gated by `scope_key` should run.
    ///
    /// No key means always; an absent key means disabled.
    pub fn scope_enabled(&self, scope_key: Option<&str>) -> bool {
        match scope_key {
            None => true,
            Some(key) => self.scope.get(key).copied().unwrap_or(false),
        }
    }

    /// Substitution variables for prompt resolution.
    ///
    /// Product options as strings, plus `scope` and, when given,
    /// `feature_name`.
    pub fn prompt_vars(&self, feature_name: Option<&str>) -> PromptVars {
        let mut vars: PromptVars = self
            .options
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        vars.insert(
            "scope".to_string(),
            Value::Object(
                self.scope
                    .iter()
                    .map(|(k, on)| (k.clone(), Value::Bool(*on)))
                    .collect(),
            ),
        );
        if let Some(feature) = feature_name {
            vars.insert("feature_name".to_string(), Value::String(feature.to_string()));
        }
        vars
    }

    pub fn report(&mut self, progress: u8, description: &str) {
        self.progress = progress;
        self.description = description.to_string();
    }

    /// Fold a step result into the run state.
    pub fn apply(&mut self, step_name: &str, result: StepResult) {
        match result {
            StepResult::Cleaned(image) => {
                self.clean_image = Some(image.clone());
                self.current_image = image;
                self.last_transform = Some(step_name.to_string());
            }
            StepResult::Transformed(image) => {
                self.current_image = image;
                self.last_transform = Some(step_name.to_string());
            }
            StepResult::Quality(verdict) => self.quality = Some(verdict),
            StepResult::Skipped => {}
            StepResult::Custom(value) => {
                debug!(step = step_name, "recorded custom step result");
                self.custom_results.push((step_name.to_string(), value));
            }
        }
    }
}
