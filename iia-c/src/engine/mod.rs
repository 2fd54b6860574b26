pub mod native;

// Re-export commonly used types
pub use native::NativeEngine;

use crate::error::Result;
use crate::image_utils::ImageData;
use crate::sd_sys;
use crate::util::config::{ContextConfig, SamplingConfig};
use serde::{Deserialize, Serialize};

/// A text-to-image engine able to create model contexts.
///
/// Dropping the returned context must destroy it on the engine side.
pub trait DiffusionEngine: Send {
    type Context: DiffusionContext;

    fn new_context(&self, params: &ContextParams) -> Result<Self::Context>;
}

/// A loaded model context.
pub trait DiffusionContext: Send {
    /// Runs a single-image synthesis. Blocks for the whole sampling run.
    fn txt2img(
        &mut self,
        request: &GenerationRequest,
        sampling: &SamplingConfig,
    ) -> Result<ImageData>;
}

/// Everything needed to create a context.
#[derive(Debug, Clone)]
pub struct ContextParams {
    pub model_path: String,
    pub vae_path: String,
    pub n_threads: i32,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub cfg_scale: f32,
    pub width: i32,
    pub height: i32,
    pub steps: i32,
    pub seed: i64,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    #[default]
    F32,
    F16,
    Q4_0,
    Q4_1,
    Q5_0,
    Q5_1,
    Q8_0,
}

impl WeightType {
    pub fn as_raw(self) -> sd_sys::sd_type_t {
        match self {
            WeightType::F32 => sd_sys::SD_TYPE_F32,
            WeightType::F16 => sd_sys::SD_TYPE_F16,
            WeightType::Q4_0 => sd_sys::SD_TYPE_Q4_0,
            WeightType::Q4_1 => sd_sys::SD_TYPE_Q4_1,
            WeightType::Q5_0 => sd_sys::SD_TYPE_Q5_0,
            WeightType::Q5_1 => sd_sys::SD_TYPE_Q5_1,
            WeightType::Q8_0 => sd_sys::SD_TYPE_Q8_0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RngType {
    #[default]
    StdDefault,
    Cuda,
}

impl RngType {
    pub fn as_raw(self) -> sd_sys::rng_type_t {
        match self {
            RngType::StdDefault => sd_sys::STD_DEFAULT_RNG,
            RngType::Cuda => sd_sys::CUDA_RNG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Default,
    Discrete,
    Karras,
}

impl Schedule {
    pub fn as_raw(self) -> sd_sys::schedule_t {
        match self {
            Schedule::Default => sd_sys::DEFAULT,
            Schedule::Discrete => sd_sys::DISCRETE,
            Schedule::Karras => sd_sys::KARRAS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    #[default]
    EulerA,
    Euler,
    Heun,
    Dpm2,
    Dpmpp2sA,
    Dpmpp2m,
    Dpmpp2mv2,
    Lcm,
}

impl SampleMethod {
    pub fn as_raw(self) -> sd_sys::sample_method_t {
        match self {
            SampleMethod::EulerA => sd_sys::EULER_A,
            SampleMethod::Euler => sd_sys::EULER,
            SampleMethod::Heun => sd_sys::HEUN,
            SampleMethod::Dpm2 => sd_sys::DPM2,
            SampleMethod::Dpmpp2sA => sd_sys::DPMPP2S_A,
            SampleMethod::Dpmpp2m => sd_sys::DPMPP2M,
            SampleMethod::Dpmpp2mv2 => sd_sys::DPMPP2Mv2,
            SampleMethod::Lcm => sd_sys::LCM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_constants() {
        assert_eq!(WeightType::default().as_raw(), sd_sys::SD_TYPE_F32);
        assert_eq!(RngType::default().as_raw(), sd_sys::STD_DEFAULT_RNG);
        assert_eq!(Schedule::default().as_raw(), sd_sys::DEFAULT);
        assert_eq!(SampleMethod::default().as_raw(), sd_sys::EULER_A);
    }

    #[test]
    fn test_quantized_types_skip_removed_ids() {
        // ids 4 and 5 were dropped from ggml
        assert_eq!(WeightType::Q5_0.as_raw(), 6);
        assert_eq!(WeightType::Q8_0.as_raw(), 8);
    }
}
