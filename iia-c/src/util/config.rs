use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{RngType, SampleMethod, Schedule, WeightType};

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".iia";

/// Engine settings the boundary does not expose. The defaults are the
/// compatibility-first values the app has always shipped with.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub context: ContextConfig,
    pub sampling: SamplingConfig,
}

/// Passed to `new_sd_ctx` alongside the model/vae paths and thread count.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    pub taesd_path: String,
    pub control_net_path: String,
    pub lora_model_dir: String,
    pub embed_dir: String,
    pub vae_decode_only: bool,
    pub vae_tiling: bool,
    pub free_params_immediately: bool,
    pub weight_type: WeightType,
    pub rng: RngType,
    pub schedule: Schedule,
    pub keep_clip_on_cpu: bool,
    pub keep_control_net_cpu: bool,
    pub keep_vae_on_cpu: bool,
}

/// Passed to `txt2img` alongside the request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub sample_method: SampleMethod,
    /// Always 1; only the first image is ever read back.
    #[serde(skip, default = "single_image")]
    pub batch_count: i32,
    pub control_strength: f32,
    pub style_strength: f32,
    pub normalize_input: bool,
    pub input_id_images_path: String,
}

fn single_image() -> i32 {
    1
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_method: SampleMethod::EulerA,
            batch_count: single_image(),
            control_strength: 0.0,
            style_strength: 0.0,
            normalize_input: false,
            input_id_images_path: String::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&config_str).with_context(|| "Failed to parse config file")
    }

    /// Load `path` if given, else `~/.iia/config.toml` if it exists, else the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(anyhow!("Config file not found: {:?}", path));
            }
            return Self::from_file(path);
        }

        match get_config_path() {
            Some(default_path) if default_path.exists() => Self::from_file(default_path),
            _ => Ok(Self::default()),
        }
    }
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_shipped_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.context.weight_type, WeightType::F32);
        assert_eq!(config.context.rng, RngType::StdDefault);
        assert_eq!(config.context.schedule, Schedule::Default);
        assert!(config.context.taesd_path.is_empty());
        assert!(config.context.control_net_path.is_empty());
        assert!(config.context.lora_model_dir.is_empty());
        assert!(config.context.embed_dir.is_empty());
        assert!(!config.context.vae_tiling);
        assert!(!config.context.keep_vae_on_cpu);

        assert_eq!(config.sampling.sample_method, SampleMethod::EulerA);
        assert_eq!(config.sampling.batch_count, 1);
        assert_eq!(config.sampling.control_strength, 0.0);
        assert!(config.sampling.input_id_images_path.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[context]
taesd_path = "/sdcard/models/taesd.safetensors"
weight_type = "q8_0"
vae_tiling = true

[sampling]
sample_method = "dpmpp2m"
"#,
        )?;

        let config = BridgeConfig::from_file(&config_path)?;
        assert_eq!(config.context.taesd_path, "/sdcard/models/taesd.safetensors");
        assert_eq!(config.context.weight_type, WeightType::Q8_0);
        assert!(config.context.vae_tiling);
        assert_eq!(config.context.rng, RngType::StdDefault);
        assert_eq!(config.sampling.sample_method, SampleMethod::Dpmpp2m);
        assert_eq!(config.sampling.batch_count, 1);

        Ok(())
    }

    #[test]
    fn test_unknown_enum_value_is_an_error() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[sampling]\nsample_method = \"ddim\"\n")?;

        assert!(BridgeConfig::from_file(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let result = BridgeConfig::load(Some(Path::new("/no/such/iia.toml")));
        assert!(result.is_err());
    }
}
