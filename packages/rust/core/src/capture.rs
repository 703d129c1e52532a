//! Optional capture of intermediate step images for debugging runs.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, error};
use uuid::Uuid;

use homeviz_shared::{HomeVizError, Result};

/// Receives the working image after each image-producing step.
///
/// Capture is best effort: implementations log failures and never stop
/// the run.
pub trait ImageSink: Send + Sync {
    fn capture(&self, run_id: Uuid, label: &str, image: &DynamicImage);
}

/// Writes captured images as `{run_id}_{label}.png` into one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| HomeVizError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: Uuid, label: &str) -> PathBuf {
        self.dir.join(format!("{run_id}_{label}.png"))
    }
}

impl ImageSink for DirectorySink {
    fn capture(&self, run_id: Uuid, label: &str, image: &DynamicImage) {
        let path = self.path_for(run_id, label);
        match image.save(&path) {
            Ok(()) => debug!(path = %path.display(), "saved step image"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to save step image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{solid, tag_of};

    #[test]
    fn writes_png_named_by_run_and_label() {
        let dir = std::env::temp_dir().join(format!("hv_capture_{}", Uuid::now_v7()));
        let sink = DirectorySink::new(&dir).unwrap();
        let run_id = Uuid::now_v7();

        sink.capture(run_id, "01_cleanup", &solid(42));

        let path = sink.path_for(run_id, "01_cleanup");
        assert_eq!(path, dir.join(format!("{run_id}_01_cleanup.png")));
        let saved = image::open(&path).unwrap();
        assert_eq!(tag_of(&saved), 42);
    }

    #[test]
    fn unwritable_target_is_logged_not_raised() {
        let dir = std::env::temp_dir().join(format!("hv_capture_{}", Uuid::now_v7()));
        let sink = DirectorySink::new(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        // Directory vanished; capture must not panic
        sink.capture(Uuid::now_v7(), "01_cleanup", &solid(1));
        assert!(!dir.exists());
    }
}
