use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, Embedding};

/// One face found in an image, and its embedding.
///
/// `detection` is `None` when nothing was detected and the whole frame was
/// encoded instead.
#[derive(Debug, Clone)]
pub struct Representation {
    pub embedding: Embedding,
    pub detection: Option<Detection>,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub params: DetectionParams,
}

impl Pipeline {
    pub fn new(detector_model: &Path, recognizer_model: &Path) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(detector_model)?,
            encoder: crate::model::recog_session(recognizer_model)?,
            params: DetectionParams::default(),
        })
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    /// Embed every face in `img`, best detection first.
    ///
    /// With `enforce_detection` off, an image with no detectable face is
    /// encoded whole and yields a single representation.
    pub fn represent(
        &mut self,
        img: &DynamicImage,
        enforce_detection: bool,
    ) -> Result<Vec<Representation>> {
        let detections = face::detect_faces(
            &mut self.detector,
            img,
            self.params.score_threshold,
            self.params.nms_threshold,
        )
        .context("detecting faces")?;

        if detections.is_empty() {
            if enforce_detection {
                anyhow::bail!("No face detected in image");
            }
            log::debug!("no face detected, encoding whole image");
            let embedding = face::encode_face(&mut self.encoder, img).context("encoding image")?;
            return Ok(vec![Representation {
                embedding,
                detection: None,
            }]);
        }

        detections
            .into_iter()
            .map(|detection| -> Result<Representation> {
                let aligned = face::align_face(img, &detection, face::ENCODER_INPUT_SIZE)
                    .context("aligning face")?;
                let embedding =
                    face::encode_face(&mut self.encoder, &aligned).context("encoding face")?;
                Ok(Representation {
                    embedding,
                    detection: Some(detection),
                })
            })
            .collect()
    }

    /// Embedding of the best face, or the whole image when detection is not enforced.
    pub fn extract_embedding(
        &mut self,
        img: &DynamicImage,
        enforce_detection: bool,
    ) -> Result<Embedding> {
        self.represent(img, enforce_detection)?
            .into_iter()
            .next()
            .map(|r| r.embedding)
            .context("pipeline produced no representation")
    }
}
