//! stable-diffusion.cpp behind the engine traits

use super::{ContextParams, DiffusionContext, DiffusionEngine, GenerationRequest};
use crate::error::{BridgeError, Result};
use crate::image_utils::ImageData;
use crate::sd_sys::{self, sd_ctx_t, sd_image_t};
use crate::util::config::SamplingConfig;
use std::ffi::{c_void, CString};
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// The linked (or simulated) stable-diffusion.cpp library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

/// Owned `sd_ctx_t`. Freed with `free_sd_ctx` on drop.
pub struct NativeContext {
    inner: NonNull<sd_ctx_t>,
}

// The context is only ever touched by one caller at a time through `&mut`.
unsafe impl Send for NativeContext {}

impl DiffusionEngine for NativeEngine {
    type Context = NativeContext;

    fn new_context(&self, params: &ContextParams) -> Result<NativeContext> {
        let cfg = &params.context;
        let model_path = CString::new(params.model_path.as_str())?;
        let vae_path = CString::new(params.vae_path.as_str())?;
        let taesd_path = CString::new(cfg.taesd_path.as_str())?;
        let control_net_path = CString::new(cfg.control_net_path.as_str())?;
        let lora_model_dir = CString::new(cfg.lora_model_dir.as_str())?;
        let embed_dir = CString::new(cfg.embed_dir.as_str())?;

        let args = sd_sys::NewCtxArgs {
            model_path: model_path.as_ptr(),
            vae_path: vae_path.as_ptr(),
            taesd_path: taesd_path.as_ptr(),
            control_net_path: control_net_path.as_ptr(),
            lora_model_dir: lora_model_dir.as_ptr(),
            embed_dir: embed_dir.as_ptr(),
            vae_decode_only: cfg.vae_decode_only,
            vae_tiling: cfg.vae_tiling,
            free_params_immediately: cfg.free_params_immediately,
            n_threads: params.n_threads,
            wtype: cfg.weight_type.as_raw(),
            rng_type: cfg.rng.as_raw(),
            schedule: cfg.schedule.as_raw(),
            keep_clip_on_cpu: cfg.keep_clip_on_cpu,
            keep_control_net_cpu: cfg.keep_control_net_cpu,
            keep_vae_on_cpu: cfg.keep_vae_on_cpu,
        };

        debug!("Calling new_sd_ctx({})", params.model_path);
        let ctx = unsafe { sd_sys::real_new_sd_ctx(&args) };

        NonNull::new(ctx)
            .map(|inner| NativeContext { inner })
            .ok_or_else(|| BridgeError::LoadFailed(params.model_path.clone()))
    }
}

impl DiffusionContext for NativeContext {
    fn txt2img(
        &mut self,
        request: &GenerationRequest,
        sampling: &SamplingConfig,
    ) -> Result<ImageData> {
        let prompt = CString::new(request.prompt.as_str())?;
        let negative_prompt = CString::new(request.negative_prompt.as_str())?;
        let id_images_path = CString::new(sampling.input_id_images_path.as_str())?;

        let args = sd_sys::Txt2ImgArgs {
            prompt: prompt.as_ptr(),
            negative_prompt: negative_prompt.as_ptr(),
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            sample_method: sampling.sample_method.as_raw(),
            sample_steps: request.steps,
            seed: request.seed,
            batch_count: sampling.batch_count,
            control_cond: std::ptr::null(),
            control_strength: sampling.control_strength,
            style_strength: sampling.style_strength,
            normalize_input: sampling.normalize_input,
            input_id_images_path: id_images_path.as_ptr(),
        };

        let raw = unsafe { sd_sys::real_txt2img(self.inner.as_ptr(), &args) };
        EngineImage(raw).copy_out()
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        unsafe { sd_sys::real_free_sd_ctx(self.inner.as_ptr()) };
        info!("Model memory freed.");
    }
}

/// Engine-allocated image. The pixel buffer is released with `free` when the
/// guard goes out of scope, whichever way `copy_out` returns.
struct EngineImage(sd_image_t);

impl EngineImage {
    fn copy_out(&self) -> Result<ImageData> {
        let img = &self.0;
        if img.data.is_null() {
            warn!("txt2img returned no data");
            return Err(BridgeError::NoImageData);
        }

        let len = ImageData::expected_len(img.width, img.height, img.channel);
        if len == 0 {
            warn!(
                "txt2img returned an empty image ({}x{}x{})",
                img.width, img.height, img.channel
            );
            return Err(BridgeError::NoImageData);
        }

        let data = unsafe { std::slice::from_raw_parts(img.data, len) }.to_vec();
        Ok(ImageData {
            width: img.width,
            height: img.height,
            channels: img.channel,
            data,
        })
    }
}

impl Drop for EngineImage {
    fn drop(&mut self) {
        if !self.0.data.is_null() {
            unsafe { libc::free(self.0.data as *mut c_void) };
        }
    }
}
