use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bank::{FeatureBank, StorageStrategy, VerifierKind};

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "FACEMATCH_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Write logs to daily files in this directory instead of stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub models: ModelConfig,

    #[serde(default)]
    pub bank: BankConfig,

    #[serde(default)]
    pub enrollment: EnrollmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Smallest face side, in pixels, the pyramid searches for
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,

    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// Score thresholds for the proposal, refine and output stages
    #[serde(default = "default_thresholds")]
    pub thresholds: [f32; 3],

    /// Larger inputs are downscaled so their longer side matches this (0 disables)
    #[serde(default = "default_max_input_side")]
    pub max_input_side: u32,
}

fn default_min_face_size() -> u32 {
    20
}

fn default_scale_factor() -> f64 {
    0.709
}

fn default_thresholds() -> [f32; 3] {
    [0.6, 0.7, 0.7]
}

fn default_max_input_side() -> u32 {
    600
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_face_size: default_min_face_size(),
            scale_factor: default_scale_factor(),
            thresholds: default_thresholds(),
            max_input_side: default_max_input_side(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory relative model paths are resolved against
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_proposal_model")]
    pub proposal: PathBuf,

    #[serde(default = "default_refine_model")]
    pub refine: PathBuf,

    #[serde(default = "default_output_model")]
    pub output: PathBuf,

    #[serde(default = "default_embedder_model")]
    pub embedder: PathBuf,

    /// Name of the image input of every model
    #[serde(default = "default_input_name")]
    pub input_name: String,

    #[serde(default = "default_embedder_input_size")]
    pub embedder_input_size: u32,

    /// Which embedder output holds the embedding
    #[serde(default = "default_embedding_output")]
    pub embedding_output: usize,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("facematch/models")
}

fn default_proposal_model() -> PathBuf {
    PathBuf::from("pnet.onnx")
}

fn default_refine_model() -> PathBuf {
    PathBuf::from("rnet.onnx")
}

fn default_output_model() -> PathBuf {
    PathBuf::from("onet.onnx")
}

fn default_embedder_model() -> PathBuf {
    PathBuf::from("facenet.onnx")
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_embedder_input_size() -> u32 {
    160
}

fn default_embedding_output() -> usize {
    1
}

fn default_intra_threads() -> usize {
    4
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            proposal: default_proposal_model(),
            refine: default_refine_model(),
            output: default_output_model(),
            embedder: default_embedder_model(),
            input_name: default_input_name(),
            embedder_input_size: default_embedder_input_size(),
            embedding_output: default_embedding_output(),
            intra_threads: default_intra_threads(),
        }
    }
}

impl ModelConfig {
    /// Resolve a model path against `dir` unless it is absolute
    pub fn resolve(&self, model: &Path) -> PathBuf {
        if model.is_absolute() {
            model.to_path_buf()
        } else {
            self.dir.join(model)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConfig {
    #[serde(default = "default_storage")]
    pub storage: StorageStrategy,

    #[serde(default = "default_verifier")]
    pub verifier: VerifierKind,

    /// Overrides the verifier's default match threshold
    #[serde(default)]
    pub threshold: Option<f32>,
}

fn default_storage() -> StorageStrategy {
    StorageStrategy::Multi
}

fn default_verifier() -> VerifierKind {
    VerifierKind::Euclidean
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            verifier: default_verifier(),
            threshold: None,
        }
    }
}

impl BankConfig {
    pub fn build(&self) -> FeatureBank {
        FeatureBank::new(self.storage, self.verifier.build(self.threshold))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "bmp".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "tif".to_string(),
        "tiff".to_string(),
    ]
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: None,
            detection: DetectionConfig::default(),
            models: ModelConfig::default(),
            bank: BankConfig::default(),
            enrollment: EnrollmentConfig::default(),
        }
    }
}

impl Config {
    /// Load from `$FACEMATCH_CONFIG` or the default location, writing a
    /// default config there when none exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load an explicitly named config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {:?}", path))?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facematch")
            .join("config.toml")
    }
}
