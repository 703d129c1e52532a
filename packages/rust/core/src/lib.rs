//! Core pipeline orchestration and domain logic for HomeViz.
//!
//! This crate ties the tenant definitions, the prompt override store, and
//! the external image services together into the visualization pipeline
//! (see [`pipeline::Orchestrator`]).

pub mod capture;
pub mod context;
pub mod gemini;
pub mod handlers;
pub mod image_diff;
pub mod pipeline;
pub mod prompts;
pub mod quality;
pub mod registry;
pub mod retry;
pub mod services;
pub mod template;

pub use capture::{DirectorySink, ImageSink};
pub use context::{PipelineExecutionContext, StepResult};
pub use gemini::GeminiClient;
pub use pipeline::{
    Orchestrator, PipelineOutcome, ProgressReporter, RunRequest, SilentProgress,
};
pub use prompts::PromptService;
pub use quality::QualityVerdict;
pub use registry::{StepEnv, StepHandler, StepRegistry};
pub use retry::{CancelToken, RetryPolicy};
pub use services::{ImageEditor, VisionEvaluator};
pub use template::PromptVars;
