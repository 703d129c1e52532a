//! Built-in step handlers.

use async_trait::async_trait;
use tracing::{info, instrument};

use homeviz_shared::{HomeVizError, Result, StepConfig};

use crate::context::{PipelineExecutionContext, StepResult};
use crate::quality::parse_quality_response;
use crate::registry::{StepEnv, StepHandler};

/// Unconditional cleanup edit; its output becomes the clean reference.
pub struct CleanupHandler;

#[async_trait]
impl StepHandler for CleanupHandler {
    #[instrument(skip_all, fields(step = step_name))]
    async fn handle(
        &self,
        step_name: &str,
        _step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult> {
        let prompt = env
            .prompts
            .resolve(step_name, &ctx.tenant_id, &ctx.prompt_vars(None))
            .await?;
        let image = env.edit(step_name, &ctx.current_image, &prompt).await?;
        info!("cleanup complete");
        Ok(StepResult::Cleaned(image))
    }
}

/// Scope-gated feature insertion.
pub struct InsertionHandler;

#[async_trait]
impl StepHandler for InsertionHandler {
    #[instrument(skip_all, fields(step = step_name))]
    async fn handle(
        &self,
        step_name: &str,
        step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult> {
        let scope_key = step_config.scope_key.as_deref();
        if !ctx.scope_enabled(scope_key) {
            info!(scope_key, "insertion skipped, scope not enabled");
            return Ok(StepResult::Skipped);
        }

        if !env.tenant.prompts.supports_insertion() {
            return Err(HomeVizError::config(format!(
                "tenant '{}' does not support insertion (step '{step_name}')",
                env.tenant.id()
            )));
        }

        let feature_name = step_config.feature_name.as_deref().unwrap_or(step_name);
        let vars = ctx.prompt_vars(Some(feature_name));
        let prompt = env.prompts.resolve(step_name, &ctx.tenant_id, &vars).await?;
        let image = env.edit(step_name, &ctx.current_image, &prompt).await?;
        info!(feature = feature_name, "insertion complete");
        Ok(StepResult::Transformed(image))
    }
}

/// Structural build-out, gated by a YES/NO question to the vision model.
///
/// The question comes from the tenant; the build-out edit prompt is
/// resolved like any other step prompt, so it can be overridden.
pub struct StructuralPrepHandler;

#[async_trait]
impl StepHandler for StructuralPrepHandler {
    #[instrument(skip_all, fields(step = step_name))]
    async fn handle(
        &self,
        step_name: &str,
        _step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult> {
        let structural = env.tenant.prompts.structural_prompts().ok_or_else(|| {
            HomeVizError::config(format!(
                "tenant '{}' does not support structural prep (step '{step_name}')",
                env.tenant.id()
            ))
        })?;

        let answer = env
            .evaluate(step_name, std::slice::from_ref(&ctx.current_image), &structural.question)
            .await?;
        if !answer_is_yes(&answer) {
            info!(answer = answer.trim(), "structural build-out not required");
            return Ok(StepResult::Skipped);
        }

        let prompt = env
            .prompts
            .resolve(step_name, &ctx.tenant_id, &ctx.prompt_vars(None))
            .await?;
        let image = env.edit(step_name, &ctx.current_image, &prompt).await?;
        info!("structural build-out complete");
        Ok(StepResult::Transformed(image))
    }
}

/// Whether a YES/NO answer says yes. Anything without a YES reads as no.
fn answer_is_yes(answer: &str) -> bool {
    answer.to_ascii_uppercase().contains("YES")
}

/// Vision review of the working image against the clean reference.
pub struct QualityCheckHandler;

#[async_trait]
impl StepHandler for QualityCheckHandler {
    #[instrument(skip_all, fields(step = step_name))]
    async fn handle(
        &self,
        step_name: &str,
        _step_config: &StepConfig,
        ctx: &PipelineExecutionContext,
        env: &StepEnv<'_>,
    ) -> Result<StepResult> {
        let prompt = env
            .prompts
            .resolve(step_name, &ctx.tenant_id, &ctx.prompt_vars(None))
            .await?;
        let images = [ctx.reference_image().clone(), ctx.current_image.clone()];
        let raw = env.evaluate(step_name, &images, &prompt).await?;
        let verdict = parse_quality_response(&raw, env.default_score);
        info!(score = verdict.score, reason = %verdict.reason, "quality check complete");
        Ok(StepResult::Quality(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeviz_shared::{HomeVizError, ProductOptions, Scope, StepType};

    use crate::registry::StepRegistry;
    use crate::registry::tests::Harness;
    use crate::services::fakes::{ScriptedVision, solid, tag_of};

    fn ctx(scope: &[(&str, bool)]) -> PipelineExecutionContext {
        PipelineExecutionContext::new(
            "boss",
            solid(1),
            scope.iter().map(|(k, v)| (k.to_string(), *v)).collect::<Scope>(),
            ProductOptions::from([("color".to_string(), "Bronze".to_string())]),
        )
    }

    #[tokio::test]
    async fn cleanup_edits_with_cleanup_prompt() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let config = harness.tenant.config.step_config("cleanup").unwrap().clone();
        let result = CleanupHandler
            .handle("cleanup", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Cleaned(ref img) if tag_of(img) == 101));
        assert_eq!(
            harness.editor.prompts(),
            vec![harness.tenant.prompts.cleanup_prompt()]
        );
    }

    #[tokio::test]
    async fn disabled_scope_skips_without_calls() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let config = harness.tenant.config.step_config("patio").unwrap().clone();
        let registry = StepRegistry::with_builtins();

        for scope in [&[("patio", false)][..], &[][..]] {
            let result = registry
                .execute("patio", &config, &ctx(scope), &harness.env())
                .await
                .unwrap();
            assert!(matches!(result, StepResult::Skipped));
        }
        assert_eq!(harness.editor.calls(), 0);
    }

    #[tokio::test]
    async fn enabled_scope_makes_one_edit_with_resolved_prompt() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let config = harness.tenant.config.step_config("doors").unwrap().clone();
        let result = InsertionHandler
            .handle("doors", &config, &ctx(&[("doors", true)]), &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Transformed(_)));

        let prompts = harness.editor.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("entry doors"));
        assert!(prompts[0].contains("Frame Color: Bronze"));
    }

    #[tokio::test]
    async fn insertion_uses_active_override() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        harness
            .prompts
            .create_override("boss", "doors", "Screens in {color} on the {feature_name}", None)
            .await
            .unwrap();
        let config = harness.tenant.config.step_config("doors").unwrap().clone();
        InsertionHandler
            .handle("doors", &config, &ctx(&[("doors", true)]), &harness.env())
            .await
            .unwrap();
        assert_eq!(
            harness.editor.prompts(),
            vec!["Screens in Bronze on the entry doors".to_string()]
        );
    }

    #[tokio::test]
    async fn step_without_scope_key_always_runs() {
        let harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        let mut config = harness.tenant.config.step_config("windows").unwrap().clone();
        config.scope_key = None;
        let result = InsertionHandler
            .handle("windows", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Transformed(_)));
        assert_eq!(harness.editor.calls(), 1);
    }

    #[tokio::test]
    async fn structural_prep_builds_out_on_yes() {
        let harness = Harness::new("boss", ScriptedVision::new(&["Yes."])).await;
        let config = harness.tenant.config.step_config("build_out").unwrap().clone();
        let mut ctx = ctx(&[]);
        ctx.apply("cleanup", StepResult::Cleaned(solid(5)));

        let result = StructuralPrepHandler
            .handle("build_out", &config, &ctx, &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Transformed(ref img) if tag_of(img) == 101));

        let structural = harness.tenant.prompts.structural_prompts().unwrap();
        let calls = harness.vision.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (vec![5], structural.question));
        assert_eq!(harness.editor.prompts(), vec![structural.build_out]);
        assert_eq!(*harness.editor.inputs.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn structural_prep_skips_on_no() {
        let harness = Harness::new("boss", ScriptedVision::new(&["NO"])).await;
        let config = harness.tenant.config.step_config("build_out").unwrap().clone();
        let result = StepRegistry::with_builtins()
            .execute("build_out", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Skipped));
        assert_eq!(harness.vision.calls(), 1);
        assert_eq!(harness.editor.calls(), 0);
    }

    #[tokio::test]
    async fn structural_prep_requires_tenant_capability() {
        let harness = Harness::new("roofs", ScriptedVision::new(&["YES"])).await;
        let config = StepConfig::new(StepType::StructuralPrep, "Checking Structure", 40);
        let err = StructuralPrepHandler
            .handle("build_out", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
        assert_eq!(harness.vision.calls(), 0);
    }

    #[test]
    fn yes_no_answers() {
        assert!(answer_is_yes("YES"));
        assert!(answer_is_yes("yes, the patio needs posts"));
        assert!(!answer_is_yes("NO"));
        assert!(!answer_is_yes(""));
    }

    #[tokio::test]
    async fn quality_check_passes_reference_then_current() {
        let harness = Harness::new(
            "boss",
            ScriptedVision::new(&[r#"{"score": 0.88, "reason": "Crisp mesh"}"#]),
        )
        .await;
        let mut ctx = ctx(&[("doors", true)]);
        ctx.apply("cleanup", StepResult::Cleaned(solid(7)));
        ctx.apply("doors", StepResult::Transformed(solid(9)));

        let config = harness.tenant.config.step_config("quality_check").unwrap().clone();
        let result = QualityCheckHandler
            .handle("quality_check", &config, &ctx, &harness.env())
            .await
            .unwrap();

        match result {
            StepResult::Quality(verdict) => {
                assert_eq!(verdict.score, 0.88);
                assert_eq!(verdict.reason, "Crisp mesh");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let calls = harness.vision.calls.lock().unwrap();
        assert_eq!(calls[0].0, vec![7, 9]);
    }

    #[tokio::test]
    async fn quality_check_without_reference_uses_current_twice() {
        let harness = Harness::new("boss", ScriptedVision::new(&["nonsense"])).await;
        let config = harness.tenant.config.step_config("quality_check").unwrap().clone();
        let result = QualityCheckHandler
            .handle("quality_check", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Quality(ref v) if v.score == 0.95));
        assert_eq!(harness.vision.calls.lock().unwrap()[0].0, vec![1, 1]);
    }

    #[tokio::test]
    async fn edit_failure_is_attributed_to_step() {
        let mut harness = Harness::new("boss", ScriptedVision::new(&["{}"])).await;
        harness.editor = harness
            .editor
            .fail_with(vec![HomeVizError::Network("HTTP 500".into())]);
        let config = harness.tenant.config.step_config("cleanup").unwrap().clone();
        let err = CleanupHandler
            .handle("cleanup", &config, &ctx(&[]), &harness.env())
            .await
            .unwrap_err();
        assert!(matches!(err, HomeVizError::Service { ref step, .. } if step == "cleanup"));
    }
}
