use clap::Parser;
use std::path::PathBuf;
use sysinfo::System;

use crate::engine::GenerationRequest;

const FALLBACK_THREADS: i32 = 4;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Generate one image with stable-diffusion.cpp", long_about = None)]
pub struct Args {
    /// Engine config file (TOML). Defaults to ~/.iia/config.toml when present.
    #[arg(short('f'), long)]
    pub config: Option<PathBuf>,

    /// Path to the model weights (.gguf / .safetensors / .ckpt)
    #[arg(short, long, env = "IIA_MODEL")]
    pub model: String,

    /// Path to separate VAE weights; empty uses the one baked into the model
    #[arg(long, default_value = "")]
    pub vae: String,

    /// CPU threads for the engine. Defaults to the physical core count.
    #[arg(short, long)]
    pub threads: Option<i32>,

    #[arg(short, long)]
    pub prompt: String,

    #[arg(short, long, default_value = "")]
    pub negative_prompt: String,

    #[arg(long, default_value_t = 7.0)]
    pub cfg_scale: f32,

    #[arg(long, default_value_t = 512)]
    pub width: i32,

    #[arg(long, default_value_t = 512)]
    pub height: i32,

    #[arg(long, default_value_t = 20)]
    pub steps: i32,

    /// Negative values let the engine pick a random seed
    #[arg(short, long, default_value_t = 42, allow_negative_numbers = true)]
    pub seed: i64,

    /// Output image; format follows the extension
    #[arg(short, long, default_value = "output.png")]
    pub output: PathBuf,
}

impl Args {
    pub fn threads(&self) -> i32 {
        self.threads.unwrap_or_else(default_threads)
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            cfg_scale: self.cfg_scale,
            width: self.width,
            height: self.height,
            steps: self.steps,
            seed: self.seed,
        }
    }
}

pub fn default_threads() -> i32 {
    System::physical_core_count()
        .and_then(|n| i32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(FALLBACK_THREADS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["iia-c", "-m", "model.gguf", "-p", "a cat"]).unwrap();
        let req = args.request();
        assert_eq!(req.width, 512);
        assert_eq!(req.height, 512);
        assert_eq!(req.steps, 20);
        assert_eq!(req.seed, 42);
        assert_eq!(req.cfg_scale, 7.0);
        assert!(args.vae.is_empty());
        assert!(args.threads() > 0);
    }

    #[test]
    fn test_negative_seed_and_explicit_threads() {
        let args = Args::try_parse_from([
            "iia-c", "-m", "model.gguf", "-p", "a cat", "--seed", "-1", "--threads", "2",
        ])
        .unwrap();
        assert_eq!(args.seed, -1);
        assert_eq!(args.threads(), 2);
    }
}
