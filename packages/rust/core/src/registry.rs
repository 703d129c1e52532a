//! Step-type dispatch: maps a step's type tag to the handler that runs it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{info, warn};

use homeviz_shared::{HomeVizError, Result, StepConfig, StepType};
use homeviz_tenants::Tenant;

use crate::context::{PipelineExecutionContext, StepResult};
use crate::handlers::{
    CleanupHandler, InsertionHandler, QualityCheckHandler, StructuralPrepHandler,
};
use crate::prompts::PromptService;
use crate::retry::{CancelToken, RetryPolicy, with_retry};
use crate::services::{ImageEditor, VisionEvaluator};

/// Collaborators a handler may use while running one step.
pub struct StepEnv<'a> {
    pub tenant: &'a Tenant,
    pub prompts: &'a PromptService,
    pub editor: &'a dyn ImageEditor,
    pub vision: &'a dyn VisionEvaluator,
    pub retry: &'a RetryPolicy,
    pub cancel: &'a CancelToken,
    /// Score used when a vision response cannot be parsed.
    pub default_score: f64,
}

impl StepEnv<'_> {
    /// Image edit under the rate-limit retry policy, attributed to `step`.
    pub async fn edit(&self, step: &str, image: &DynamicImage, prompt: &str) -> Result<DynamicImage> {
        let editor = self.editor;
        with_retry(step, self.retry, self.cancel, move || editor.edit(image, prompt)).await
    }

    /// Vision call under the rate-limit retry policy, attributed to `step`.
    pub async fn evaluate(&self, step: &str, images: &[DynamicImage], prompt: &str) -> Result<String> {
        let vision = self.vision;
        with_retry(step, self.retry, self.cancel, move || vision.evaluate(images, prompt)).await
    }
}

/// Runs one kind of pipeline step.
///
/// Handlers read the context and return a [`StepResult`]; the orchestrator
/// folds it back into the context.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(
        &self,
        step_name: &str,
        step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult>;
}

/// Step-type tag → handler.
#[derive(Default, Clone)]
pub struct StepRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    /// Registry with no handlers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(StepType::Cleanup, Arc::new(CleanupHandler));
        registry.register(StepType::Insertion, Arc::new(InsertionHandler));
        registry.register(StepType::StructuralPrep, Arc::new(StructuralPrepHandler));
        registry.register(StepType::QualityCheck, Arc::new(QualityCheckHandler));
        registry
    }

    /// Bind `step_type` to `handler`. A later registration replaces an earlier one.
    pub fn register(&mut self, step_type: StepType, handler: Arc<dyn StepHandler>) {
        if self.handlers.insert(step_type.clone(), handler).is_some() {
            warn!(step_type = %step_type, "replaced step handler");
        } else {
            info!(step_type = %step_type, "registered step handler");
        }
    }

    pub fn get(&self, step_type: &StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(step_type).cloned()
    }

    /// Registered type tags, sorted.
    pub fn step_types(&self) -> Vec<StepType> {
        let mut types: Vec<StepType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Dispatch a step to its handler and return the handler's result as is.
    pub async fn execute(
        &self,
        step_name: &str,
        step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult> {
        let step_type = step_config.step_type.as_ref().ok_or_else(|| {
            HomeVizError::config(format!("step config missing 'type' for step '{step_name}'"))
        })?;

        let handler = self.get(step_type).ok_or_else(|| {
            HomeVizError::config(format!(
                "no handler registered for step type '{step_type}'"
            ))
        })?;

        handler.handle(step_name, step_config, ctx, env).await
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use homeviz_shared::{ProductOptions, Scope};
    use homeviz_storage::Storage;
    use homeviz_tenants::{TenantProvider, TenantRegistry};
    use serde_json::json;
    use uuid::Uuid;

    use crate::services::fakes::{RecordingEditor, ScriptedVision, solid};

    /// Shared wiring for handler and registry tests.
    pub(crate) struct Harness {
        pub tenant: Arc<Tenant>,
        pub prompts: PromptService,
        pub editor: RecordingEditor,
        pub vision: ScriptedVision,
        pub retry: RetryPolicy,
        pub cancel: CancelToken,
    }

    impl Harness {
        pub async fn new(tenant_id: &str, vision: ScriptedVision) -> Self {
            let tenants = Arc::new(TenantRegistry::with_builtins().unwrap());
            let tenant = tenants.get_config(tenant_id).unwrap();
            let tmp = std::env::temp_dir().join(format!("hv_registry_{}.db", Uuid::now_v7()));
            let store = Arc::new(Storage::open(&tmp).await.unwrap());
            Self {
                tenant,
                prompts: PromptService::new(tenants, store),
                editor: RecordingEditor::new(),
                vision,
                retry: RetryPolicy::immediate(4),
                cancel: CancelToken::new(),
            }
        }

        pub fn env(&self) -> StepEnv<'_> {
            StepEnv {
                tenant: &self.tenant,
                prompts: &self.prompts,
                editor: &self.editor,
                vision: &self.vision,
                retry: &self.retry,
                cancel: &self.cancel,
                default_score: 0.95,
            }
        }
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepHandler for Recorder {
        async fn handle(
            &self,
            step_name: &str,
            _step_config: &StepConfig,
            _ctx: &PipelineExecutionContext,
            _env: &StepEnv<'_>,
        ) -> Result<StepResult> {
            self.seen.lock().unwrap().push(step_name.to_string());
            Ok(StepResult::Custom(json!({"step": step_name})))
        }
    }

    fn ctx() -> PipelineExecutionContext {
        PipelineExecutionContext::new("boss", solid(1), Scope::new(), ProductOptions::new())
    }

    #[test]
    fn builtins_are_registered() {
        let registry = StepRegistry::with_builtins();
        assert_eq!(
            registry.step_types(),
            vec![
                StepType::Cleanup,
                StepType::Insertion,
                StepType::StructuralPrep,
                StepType::QualityCheck
            ]
        );
        assert!(registry.get(&StepType::Custom("sky_replace".into())).is_none());
        assert!(StepRegistry::empty().get(&StepType::Cleanup).is_none());
    }

    #[tokio::test]
    async fn missing_type_is_config_error() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let registry = StepRegistry::with_builtins();
        let err = registry
            .execute("mystery", &StepConfig::default(), &ctx(), &harness.env())
            .await
            .unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
        assert!(err.to_string().contains("mystery"));
        assert_eq!(harness.editor.calls(), 0);
    }

    #[tokio::test]
    async fn unregistered_type_is_config_error() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let registry = StepRegistry::empty();
        let config = StepConfig::new(StepType::Cleanup, "Cleaning", 10);
        let err = registry
            .execute("cleanup", &config, &ctx(), &harness.env())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no handler registered"));
    }

    #[tokio::test]
    async fn custom_handler_result_is_returned_unmodified() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = StepRegistry::with_builtins();
        let tag = StepType::Custom("sky_replace".into());
        registry.register(tag.clone(), recorder.clone());

        let config = StepConfig::new(tag, "Prep", 40);
        let result = registry
            .execute("prep", &config, &ctx(), &harness.env())
            .await
            .unwrap();
        match result {
            StepResult::Custom(value) => assert_eq!(value, json!({"step": "prep"})),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["prep".to_string()]);
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = StepRegistry::with_builtins();
        registry.register(StepType::Cleanup, recorder.clone());

        let config = StepConfig::new(StepType::Cleanup, "Cleaning", 10);
        registry
            .execute("cleanup", &config, &ctx(), &harness.env())
            .await
            .unwrap();
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
        assert_eq!(harness.editor.calls(), 0);
    }
}
