//! External generative-service capabilities used by pipeline steps.
//!
//! Both traits are opaque remote calls. Implementations report a rate limit
//! as [`HomeVizError::RateLimited`](homeviz_shared::HomeVizError::RateLimited)
//! and every other failure as a network or image error; the retry layer
//! decides what is retryable.

use async_trait::async_trait;
use image::DynamicImage;

use homeviz_shared::Result;

/// Applies a natural-language edit to an image.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit(&self, image: &DynamicImage, prompt: &str) -> Result<DynamicImage>;
}

/// Answers a prompt about one or more images with raw text.
#[async_trait]
pub trait VisionEvaluator: Send + Sync {
    async fn evaluate(&self, images: &[DynamicImage], prompt: &str) -> Result<String>;
}
