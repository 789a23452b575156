//! Request and response bodies for the two face routes.
//!
//! Bodies are parsed leniently: unparseable JSON or a non-object body is
//! treated the same as missing fields, so every input problem surfaces as a
//! 400 with a readable message rather than an extractor rejection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ApiError;

fn parse_lenient<T: for<'de> Deserialize<'de> + Default>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEmbeddingRequest {
    #[serde(default)]
    pub image_path: Option<Value>,
}

impl GenerateEmbeddingRequest {
    pub fn from_body(body: &[u8]) -> Self {
        parse_lenient(body)
    }

    /// The non-empty image path.
    pub fn validate(&self) -> Result<&str, ApiError> {
        match self.image_path.as_ref().and_then(Value::as_str) {
            Some(path) if !path.is_empty() => Ok(path),
            _ => Err(ApiError::bad_request("Missing imagePath in request body")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyFaceRequest {
    #[serde(default)]
    pub face_image: Option<Value>,
    #[serde(default)]
    pub stored_embeddings: Option<Value>,
}

impl VerifyFaceRequest {
    pub fn from_body(body: &[u8]) -> Self {
        parse_lenient(body)
    }

    /// The base64 image and the raw candidate list.
    ///
    /// Candidates are left unparsed; malformed entries are skipped later.
    pub fn validate(&self) -> Result<(&str, &[Value]), ApiError> {
        let face_image = self
            .face_image
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let stored = self.stored_embeddings.as_ref().filter(|v| !v.is_null());

        let (Some(face_image), Some(stored)) = (face_image, stored) else {
            return Err(ApiError::bad_request("Missing image or stored embeddings"));
        };

        match stored.as_array() {
            Some(list) if !list.is_empty() => Ok((face_image, list.as_slice())),
            _ => Err(ApiError::bad_request(
                "storedEmbeddings must be a non-empty list",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResponse {
    pub status: String,
    pub embedding: Vec<f32>,
}

impl EmbeddingResponse {
    pub fn success(embedding: Vec<f32>) -> Self {
        Self {
            status: "success".to_string(),
            embedding,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyResponse {
    pub status: String,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub confidence: f32,
}

impl VerifyResponse {
    pub fn success(is_match: bool, confidence: f32) -> Self {
        Self {
            status: "success".to_string(),
            is_match,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}
