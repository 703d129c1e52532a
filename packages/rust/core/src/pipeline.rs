//! End-to-end visualization run: cleanup → insertions → quality gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use homeviz_shared::{
    HomeVizError, IdenticalOutputPolicy, ProductOptions, QualityConfig, Result, Scope, StepConfig,
};

use crate::capture::ImageSink;
use crate::context::{PipelineExecutionContext, StepResult};
use crate::image_diff::is_identical;
use crate::prompts::PromptService;
use crate::registry::{StepEnv, StepRegistry};
use crate::retry::{CancelToken, RetryPolicy};
use crate::services::{ImageEditor, VisionEvaluator};

/// Input for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tenant_id: String,
    pub image: DynamicImage,
    pub scope: Scope,
    pub options: ProductOptions,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    /// Cleanup output, if the tenant has a cleanup step.
    pub clean_image: Option<DynamicImage>,
    pub final_image: DynamicImage,
    /// `None` when the tenant has no quality check.
    pub score: Option<f64>,
    pub reason: Option<String>,
    /// Whether the corrective refine pass ran.
    pub quality_retried: bool,
    /// Final image matched the input (see [`is_identical`]).
    pub identical_to_input: bool,
    /// Step names dispatched, in order.
    pub steps_executed: Vec<String>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a step starts, with its progress weight and description.
    fn report(&self, percent: u8, message: &str);
    /// Called when the run completes.
    fn done(&self, outcome: &PipelineOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _percent: u8, _message: &str) {}
    fn done(&self, _outcome: &PipelineOutcome) {}
}

/// Drives tenant pipelines against the external services.
pub struct Orchestrator {
    registry: StepRegistry,
    prompts: Arc<PromptService>,
    editor: Arc<dyn ImageEditor>,
    vision: Arc<dyn VisionEvaluator>,
    retry: RetryPolicy,
    quality: QualityConfig,
    sink: Option<Arc<dyn ImageSink>>,
}

impl Orchestrator {
    /// Orchestrator with the built-in handlers and default policies.
    pub fn new(
        prompts: Arc<PromptService>,
        editor: Arc<dyn ImageEditor>,
        vision: Arc<dyn VisionEvaluator>,
    ) -> Self {
        Self {
            registry: StepRegistry::with_builtins(),
            prompts,
            editor,
            vision,
            retry: RetryPolicy::default(),
            quality: QualityConfig::default(),
            sink: None,
        }
    }

    pub fn with_registry(mut self, registry: StepRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    /// Capture the working image after every image-producing step.
    pub fn with_image_sink(mut self, sink: Arc<dyn ImageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the tenant's pipeline over `request.image`.
    ///
    /// 1. Dispatch every step in tenant order
    /// 2. On a failing quality score, refine the last applied edit and re-check
    /// 3. Compare the final image with the input
    #[instrument(skip_all, fields(tenant = %request.tenant_id, run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let tenant = self.prompts.tenants().get_config(&request.tenant_id)?;
        let steps = tenant.config.ordered_steps()?;

        let mut ctx = PipelineExecutionContext::new(
            tenant.id(),
            request.image,
            request.scope,
            request.options,
        );
        tracing::Span::current().record("run_id", tracing::field::display(ctx.run_id));
        info!(steps = steps.len(), "starting pipeline");

        let env = StepEnv {
            tenant: &tenant,
            prompts: &self.prompts,
            editor: self.editor.as_ref(),
            vision: self.vision.as_ref(),
            retry: &self.retry,
            cancel,
            default_score: self.quality.default_score,
        };

        // --- Step dispatch ---
        let mut steps_executed = Vec::with_capacity(steps.len());
        let mut quality_step: Option<(&str, &StepConfig)> = None;

        for (index, &(name, config)) in steps.iter().enumerate() {
            cancel.check()?;
            let percent = config.progress_weight.unwrap_or(ctx.progress);
            let message = config.description.as_deref().unwrap_or(name);
            ctx.report(percent, message);
            progress.report(percent, message);
            info!(step = name, percent, "running step");

            let result = self.registry.execute(name, config, &ctx, &env).await?;
            let capture_suffix = match &result {
                StepResult::Cleaned(_) | StepResult::Transformed(_) => Some(""),
                StepResult::Skipped => Some("_skipped"),
                StepResult::Quality(_) => {
                    quality_step = Some((name, config));
                    None
                }
                StepResult::Custom(_) => None,
            };
            ctx.apply(name, result);
            if let Some(suffix) = capture_suffix {
                self.capture(&ctx, &format!("{:02}_{name}{suffix}", index + 1));
            }
            steps_executed.push(name.to_string());
        }
        let mut capture_seq = steps.len();

        // --- Quality gate ---
        let mut quality_retried = false;
        if let Some((q_name, q_config)) = quality_step {
            let threshold = self.quality.pass_threshold;
            let budget = self.quality.max_retries.max(1);
            let mut attempts = 0;

            while attempts < budget
                && ctx.quality.as_ref().is_some_and(|v| !v.passes(threshold))
            {
                attempts += 1;
                let score = ctx.quality.as_ref().map(|v| v.score).unwrap_or_default();
                let verdict = ctx.quality.as_ref().and_then(|v| v.passed);
                warn!(
                    score,
                    ?verdict,
                    threshold,
                    attempt = attempts,
                    "quality check failed, refining"
                );
                progress.report(ctx.progress, "Refining result");

                capture_seq += 1;
                if !self.refine(&mut ctx, &env, capture_seq).await? {
                    break;
                }
                quality_retried = true;

                let result = self.registry.execute(q_name, q_config, &ctx, &env).await?;
                ctx.apply(q_name, result);
            }
        }

        // --- No-op detection ---
        let mut identical = is_identical(&ctx.original_image, &ctx.current_image);
        if identical {
            match self.quality.identical_policy {
                IdenticalOutputPolicy::Log => {
                    error!("CRITICAL: final image is identical to the input image");
                }
                IdenticalOutputPolicy::Fail => {
                    error!("CRITICAL: final image is identical to the input image, aborting");
                    return Err(HomeVizError::IdenticalOutput);
                }
                IdenticalOutputPolicy::Retry => {
                    warn!("final image is identical to the input image, refining once more");
                    capture_seq += 1;
                    if self.refine(&mut ctx, &env, capture_seq).await? {
                        if let Some((q_name, q_config)) = quality_step {
                            let result =
                                self.registry.execute(q_name, q_config, &ctx, &env).await?;
                            ctx.apply(q_name, result);
                        }
                        identical = is_identical(&ctx.original_image, &ctx.current_image);
                    }
                    if identical {
                        error!("CRITICAL: final image is still identical to the input image");
                    }
                }
            }
        }

        progress.report(100, "Complete");

        let outcome = PipelineOutcome {
            run_id: ctx.run_id,
            score: ctx.quality.as_ref().map(|v| v.score),
            reason: ctx.quality.map(|v| v.reason),
            clean_image: ctx.clean_image,
            final_image: ctx.current_image,
            quality_retried,
            identical_to_input: identical,
            steps_executed,
            elapsed: start.elapsed(),
        };

        info!(
            score = ?outcome.score,
            quality_retried,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "pipeline complete"
        );
        progress.done(&outcome);
        Ok(outcome)
    }

    /// Re-run the last applied transform step's edit with the tenant's
    /// refine prompt.
    ///
    /// Returns `false` when no transform was applied in this run.
    async fn refine(
        &self,
        ctx: &mut PipelineExecutionContext,
        env: &StepEnv<'_>,
        capture_seq: usize,
    ) -> Result<bool> {
        let Some(step) = ctx.last_transform.clone() else {
            warn!("no transform step to refine");
            return Ok(false);
        };
        env.cancel.check()?;
        let prompt = env.tenant.prompts.refine_prompt();
        let image = env.edit(&step, &ctx.current_image, &prompt).await?;
        ctx.apply(&step, StepResult::Transformed(image));
        self.capture(ctx, &format!("{capture_seq:02}_{step}_refine"));
        Ok(true)
    }

    fn capture(&self, ctx: &PipelineExecutionContext, label: &str) {
        if let Some(sink) = &self.sink {
            sink.capture(ctx.run_id, label, &ctx.current_image);
        }
    }
}
