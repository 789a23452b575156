use anyhow::{Context, Result};
use facegate_vision::{model, DetectionParams};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_CONFIG_PATH").unwrap_or("/usr/local/etc/facegate/config.toml"))
});

pub static MODEL_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_MODEL_DIR").unwrap_or("/usr/local/share/facegate"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Minimum cosine similarity for a match.
    pub threshold: f32,
    /// Required length of a stored embedding.
    pub embedding_dim: usize,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5001,
            threshold: 0.7,
            embedding_dim: 128,
            detector_model: MODEL_DIR.join(model::DETECTOR_MODEL_FILE),
            recognizer_model: MODEL_DIR.join(model::RECOGNIZER_MODEL_FILE),
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be within [-1, 1], got {}", self.threshold);
        }
        if self.embedding_dim == 0 {
            anyhow::bail!("embedding_dim must be positive");
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            );
        }
        if !(self.nms_threshold > 0.0 && self.nms_threshold <= 1.0) {
            anyhow::bail!(
                "nms_threshold must be within (0, 1], got {}",
                self.nms_threshold
            );
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
