use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use facegate_vision::decode_base64_image;
use log::{debug, info};

use super::errors::ApiError;
use super::request::{
    EmbeddingResponse, GenerateEmbeddingRequest, HealthResponse, VerifyFaceRequest,
    VerifyResponse,
};
use super::server::AppState;
use crate::matcher;
use crate::provider::EmbeddingProvider;

const REREGISTER: &str = "Stored face data is invalid. Please re-register your face.";

/// Run blocking model work off the async workers.
async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(what, e))?
}

fn provider(state: &AppState) -> Result<Arc<dyn EmbeddingProvider>, ApiError> {
    state.provider.clone().ok_or(ApiError::ModelUnavailable)
}

/// POST /generate-embedding
///
/// Body `{"imagePath": "..."}`. Embeds the best face in the image on disk,
/// or the whole image when no face is found.
pub async fn generate_embedding(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let request = GenerateEmbeddingRequest::from_body(&body);
    let image_path = request.validate()?;
    info!("Received imagePath: {}", image_path);

    if !Path::new(image_path).exists() {
        return Err(ApiError::bad_request(format!(
            "Image file not found at {}",
            image_path
        )));
    }
    let provider = provider(&state)?;

    let path = PathBuf::from(image_path);
    let embedding = blocking("Failed to generate embedding", move || {
        let img = image::open(&path).map_err(|e| {
            ApiError::bad_request(format!("Failed to load image at {}: {}", path.display(), e))
        })?;
        provider
            .embed(&img, false)
            .map_err(|e| ApiError::internal("Failed to generate embedding", format!("{:#}", e)))
    })
    .await?;

    info!(
        "Embedding generated for {} ({} dims)",
        image_path,
        embedding.len()
    );
    Ok(Json(EmbeddingResponse::success(embedding)))
}

/// POST /verify-face
///
/// Body `{"faceImage": "<base64>", "storedEmbeddings": [[...], ...]}`.
/// Compares the captured face with every well-formed stored embedding and
/// reports the best cosine similarity.
pub async fn verify_face(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, ApiError> {
    let request = VerifyFaceRequest::from_body(&body);
    let (face_image, stored) = request.validate()?;
    let provider = provider(&state)?;

    let face_image = face_image.to_owned();
    let probe = blocking("Face verification failed", move || {
        let img = decode_base64_image(&face_image).map_err(|e| {
            ApiError::bad_request(format!("Failed to decode base64 image: {}", e))
        })?;
        provider
            .embed(&img, false)
            .map_err(|e| ApiError::internal("Face verification failed", format!("{:#}", e)))
    })
    .await?;

    if !matcher::has_magnitude(&probe) {
        return Err(ApiError::internal(
            "Face verification failed",
            "captured image produced a zero-magnitude embedding",
        ));
    }
    let Some(result) = matcher::verify(&probe, stored, state.embedding_dim, state.threshold)
    else {
        return Err(ApiError::bad_request(REREGISTER));
    };
    debug!(
        "scored {} of {} stored embeddings",
        result.compared,
        stored.len()
    );
    info!(
        "Verification result: match={}, confidence={:.3}",
        result.is_match, result.confidence
    );

    Ok(Json(VerifyResponse::success(
        result.is_match,
        result.confidence,
    )))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.provider.is_some(),
    })
}
