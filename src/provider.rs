//! The embedding model as seen by the HTTP layer.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use facegate_vision::{Pipeline, Representation};
use image::DynamicImage;

use crate::config::Config;

/// Computes face embeddings for an image.
///
/// Implementations are loaded once and shared read-only across requests.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeddings for every face in `img`, best detection first.
    fn represent(&self, img: &DynamicImage, enforce_detection: bool) -> Result<Vec<Representation>>;

    /// First representation's embedding as a plain vector.
    fn embed(&self, img: &DynamicImage, enforce_detection: bool) -> Result<Vec<f32>> {
        self.represent(img, enforce_detection)?
            .into_iter()
            .next()
            .map(|r| r.embedding.to_vec())
            .context("no face representation produced")
    }
}

/// ONNX detector + recognizer pipeline behind a lock; sessions need `&mut` to run.
pub struct PipelineProvider {
    pipeline: Mutex<Pipeline>,
}

impl PipelineProvider {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }

    pub fn load(cfg: &Config) -> Result<Self> {
        let pipeline = Pipeline::new(&cfg.detector_model, &cfg.recognizer_model)
            .context("initializing face recognition pipeline")?
            .with_params(cfg.detection_params());
        Ok(Self::new(pipeline))
    }
}

impl EmbeddingProvider for PipelineProvider {
    fn represent(&self, img: &DynamicImage, enforce_detection: bool) -> Result<Vec<Representation>> {
        lock_recovering(&self.pipeline).represent(img, enforce_detection)
    }
}

/// Lock `mutex`, taking the guard back if an earlier holder panicked.
///
/// The pipeline keeps no cross-call state, so a panic mid-inference leaves it
/// usable for the next request.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("embedding pipeline lock was poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Load the provider, falling back to `None` so the server still starts.
pub fn load_provider(cfg: &Config) -> Option<PipelineProvider> {
    log::info!("Loading face embedding models...");
    match PipelineProvider::load(cfg) {
        Ok(provider) => {
            log::info!("Models loaded");
            Some(provider)
        }
        Err(e) => {
            log::error!("Error loading face embedding models: {:#}", e);
            None
        }
    }
}
