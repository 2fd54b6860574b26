// ============================================================================
// stable-diffusion.cpp C API
// ============================================================================
//
// Hand-written declarations for the subset of `stable-diffusion.h` the bridge
// calls. Android (and desktop with the `native` feature) links the real
// library from build.rs; every other build gets a simulated engine with the
// same call shape so the bridge and its tests run without model files.
// ============================================================================

#![allow(non_camel_case_types, non_upper_case_globals)]

use std::ffi::{c_char, c_float, c_int, c_uint};

/// Opaque engine context
#[repr(C)]
pub struct sd_ctx_t {
    _private: [u8; 0],
}

/// Image returned by `txt2img`. `data` is allocated with `malloc` and owned by
/// the caller once returned.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct sd_image_t {
    pub width: u32,
    pub height: u32,
    pub channel: u32,
    pub data: *mut u8,
}

pub type sd_type_t = c_uint;
pub const SD_TYPE_F32: sd_type_t = 0;
pub const SD_TYPE_F16: sd_type_t = 1;
pub const SD_TYPE_Q4_0: sd_type_t = 2;
pub const SD_TYPE_Q4_1: sd_type_t = 3;
pub const SD_TYPE_Q5_0: sd_type_t = 6;
pub const SD_TYPE_Q5_1: sd_type_t = 7;
pub const SD_TYPE_Q8_0: sd_type_t = 8;

pub type rng_type_t = c_uint;
pub const STD_DEFAULT_RNG: rng_type_t = 0;
pub const CUDA_RNG: rng_type_t = 1;

pub type sample_method_t = c_uint;
pub const EULER_A: sample_method_t = 0;
pub const EULER: sample_method_t = 1;
pub const HEUN: sample_method_t = 2;
pub const DPM2: sample_method_t = 3;
pub const DPMPP2S_A: sample_method_t = 4;
pub const DPMPP2M: sample_method_t = 5;
pub const DPMPP2Mv2: sample_method_t = 6;
pub const LCM: sample_method_t = 7;

pub type schedule_t = c_uint;
pub const DEFAULT: schedule_t = 0;
pub const DISCRETE: schedule_t = 1;
pub const KARRAS: schedule_t = 2;

// ============================================================================
// Real stable-diffusion.cpp functions
// ============================================================================

#[cfg(sd_native)]
extern "C" {
    fn new_sd_ctx(
        model_path: *const c_char,
        vae_path: *const c_char,
        taesd_path: *const c_char,
        control_net_path: *const c_char,
        lora_model_dir: *const c_char,
        embed_dir: *const c_char,
        vae_decode_only: bool,
        vae_tiling: bool,
        free_params_immediately: bool,
        n_threads: c_int,
        wtype: sd_type_t,
        rng_type: rng_type_t,
        schedule: schedule_t,
        keep_clip_on_cpu: bool,
        keep_control_net_cpu: bool,
        keep_vae_on_cpu: bool,
    ) -> *mut sd_ctx_t;

    fn free_sd_ctx(ctx: *mut sd_ctx_t);

    fn txt2img(
        ctx: *mut sd_ctx_t,
        prompt: *const c_char,
        negative_prompt: *const c_char,
        cfg_scale: c_float,
        width: c_int,
        height: c_int,
        sample_method: sample_method_t,
        sample_steps: c_int,
        seed: i64,
        batch_count: c_int,
        control_cond: *const sd_image_t,
        control_strength: c_float,
        style_strength: c_float,
        normalize_input: bool,
        input_id_images_path: *const c_char,
    ) -> sd_image_t;
}

/// Arguments for `new_sd_ctx`, in declaration order.
#[cfg_attr(not(sd_native), allow(dead_code))]
pub struct NewCtxArgs {
    pub model_path: *const c_char,
    pub vae_path: *const c_char,
    pub taesd_path: *const c_char,
    pub control_net_path: *const c_char,
    pub lora_model_dir: *const c_char,
    pub embed_dir: *const c_char,
    pub vae_decode_only: bool,
    pub vae_tiling: bool,
    pub free_params_immediately: bool,
    pub n_threads: c_int,
    pub wtype: sd_type_t,
    pub rng_type: rng_type_t,
    pub schedule: schedule_t,
    pub keep_clip_on_cpu: bool,
    pub keep_control_net_cpu: bool,
    pub keep_vae_on_cpu: bool,
}

/// Arguments for `txt2img`, minus the context.
#[cfg_attr(not(sd_native), allow(dead_code))]
pub struct Txt2ImgArgs {
    pub prompt: *const c_char,
    pub negative_prompt: *const c_char,
    pub cfg_scale: c_float,
    pub width: c_int,
    pub height: c_int,
    pub sample_method: sample_method_t,
    pub sample_steps: c_int,
    pub seed: i64,
    pub batch_count: c_int,
    pub control_cond: *const sd_image_t,
    pub control_strength: c_float,
    pub style_strength: c_float,
    pub normalize_input: bool,
    pub input_id_images_path: *const c_char,
}

#[cfg(sd_native)]
pub(crate) unsafe fn real_new_sd_ctx(a: &NewCtxArgs) -> *mut sd_ctx_t {
    new_sd_ctx(
        a.model_path,
        a.vae_path,
        a.taesd_path,
        a.control_net_path,
        a.lora_model_dir,
        a.embed_dir,
        a.vae_decode_only,
        a.vae_tiling,
        a.free_params_immediately,
        a.n_threads,
        a.wtype,
        a.rng_type,
        a.schedule,
        a.keep_clip_on_cpu,
        a.keep_control_net_cpu,
        a.keep_vae_on_cpu,
    )
}

#[cfg(sd_native)]
pub(crate) unsafe fn real_free_sd_ctx(ctx: *mut sd_ctx_t) {
    free_sd_ctx(ctx)
}

#[cfg(sd_native)]
pub(crate) unsafe fn real_txt2img(ctx: *mut sd_ctx_t, a: &Txt2ImgArgs) -> sd_image_t {
    txt2img(
        ctx,
        a.prompt,
        a.negative_prompt,
        a.cfg_scale,
        a.width,
        a.height,
        a.sample_method,
        a.sample_steps,
        a.seed,
        a.batch_count,
        a.control_cond,
        a.control_strength,
        a.style_strength,
        a.normalize_input,
        a.input_id_images_path,
    )
}

// ============================================================================
// Non-native (fallback to simulation)
// ============================================================================

#[cfg(not(sd_native))]
pub(crate) unsafe fn real_new_sd_ctx(a: &NewCtxArgs) -> *mut sd_ctx_t {
    simulate::new_sd_ctx(a)
}

#[cfg(not(sd_native))]
pub(crate) unsafe fn real_free_sd_ctx(ctx: *mut sd_ctx_t) {
    simulate::free_sd_ctx(ctx)
}

#[cfg(not(sd_native))]
pub(crate) unsafe fn real_txt2img(ctx: *mut sd_ctx_t, a: &Txt2ImgArgs) -> sd_image_t {
    simulate::txt2img(ctx, a)
}

#[cfg(not(sd_native))]
pub(crate) mod simulate {
    use super::{sd_ctx_t, sd_image_t, NewCtxArgs, Txt2ImgArgs};
    use std::ffi::{c_int, CStr};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

    struct SimulatedContext {
        n_threads: c_int,
    }

    /// Number of simulated contexts created and not yet freed.
    #[cfg(test)]
    pub fn live_contexts() -> usize {
        LIVE_CONTEXTS.load(Ordering::SeqCst)
    }

    pub unsafe fn new_sd_ctx(a: &NewCtxArgs) -> *mut sd_ctx_t {
        if a.model_path.is_null() {
            return std::ptr::null_mut();
        }

        let path = CStr::from_ptr(a.model_path).to_str().unwrap_or("");
        if path.is_empty() || !Path::new(path).exists() {
            debug!("Simulating new_sd_ctx({}): no such model", path);
            return std::ptr::null_mut();
        }

        debug!("Simulating new_sd_ctx({}, threads={})", path, a.n_threads);
        LIVE_CONTEXTS.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(SimulatedContext {
            n_threads: a.n_threads,
        })) as *mut sd_ctx_t
    }

    pub unsafe fn free_sd_ctx(ctx: *mut sd_ctx_t) {
        if ctx.is_null() {
            return;
        }
        let ctx = Box::from_raw(ctx as *mut SimulatedContext);
        debug!("Simulating free_sd_ctx(threads={})", ctx.n_threads);
        LIVE_CONTEXTS.fetch_sub(1, Ordering::SeqCst);
    }

    /// Deterministic RGB gradient keyed on the seed.
    pub unsafe fn txt2img(ctx: *mut sd_ctx_t, a: &Txt2ImgArgs) -> sd_image_t {
        let empty = sd_image_t {
            width: 0,
            height: 0,
            channel: 3,
            data: std::ptr::null_mut(),
        };
        if ctx.is_null() || a.width <= 0 || a.height <= 0 {
            return empty;
        }

        let (w, h) = (a.width as usize, a.height as usize);
        let data = libc::malloc(w * h * 3) as *mut u8;
        if data.is_null() {
            return empty;
        }

        let pixels = std::slice::from_raw_parts_mut(data, w * h * 3);
        let tint = (a.seed as u64 % 256) as u8;
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                pixels[i] = (x * 255 / w.max(1)) as u8;
                pixels[i + 1] = (y * 255 / h.max(1)) as u8;
                pixels[i + 2] = tint;
            }
        }

        sd_image_t {
            width: a.width as u32,
            height: a.height as u32,
            channel: 3,
            data,
        }
    }
}
