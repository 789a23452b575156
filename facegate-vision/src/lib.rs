pub mod decode;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod similarity;
pub mod yunet;

// Re-export commonly used types
pub use decode::{decode_base64_image, ImageDecodeError};
pub use face::{Detection, Embedding};
pub use pipeline::{DetectionParams, Pipeline, Representation};
pub use similarity::cosine_similarity;
