// ============================================================================
// IIA Diffusion Bridge - Native Interface Layer
// ============================================================================
//
// One process-wide model session, driven from Kotlin through JNI (Android) or
// from any C caller through the `iia_*` functions below. Both surfaces funnel
// into the same safe functions, which take the session lock for the whole
// call: load, generate and free never overlap. Status queries read a separate
// record and never wait on the engine.
// ============================================================================

use once_cell::sync::Lazy;
use std::ffi::{c_char, c_float, c_int, CStr, CString};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, warn};

// Export modules
pub mod engine;
pub mod error;
pub mod image_utils;
pub mod sd_sys;
pub mod session;
pub mod util;

// JNI wrapper module
#[cfg(target_os = "android")]
pub mod jni_sd;

pub use engine::{GenerationRequest, NativeEngine};
pub use error::BridgeError;
pub use image_utils::ImageData;
pub use session::{ModelSession, ModelStatusInfo, SharedStatus};

// ============================================================================
// Global Session State
// ============================================================================

// Global model status, kept apart from the session lock
pub static MODEL_STATUS: Lazy<SharedStatus> =
    Lazy::new(|| Arc::new(Mutex::new(ModelStatusInfo::new())));

static GLOBAL_SESSION: Lazy<Mutex<ModelSession<NativeEngine>>> = Lazy::new(|| {
    Mutex::new(ModelSession::with_status(
        NativeEngine,
        Default::default(),
        MODEL_STATUS.clone(),
    ))
});

#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

// A panic while holding the lock leaves the session itself consistent
// (every field is updated after the engine call returns), so keep going.
fn session() -> MutexGuard<'static, ModelSession<NativeEngine>> {
    GLOBAL_SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Load a model into the global session, replacing any previous one.
pub fn load_model(model_path: &str, vae_path: &str, n_threads: i32) -> bool {
    session().load(model_path, vae_path, n_threads).is_ok()
}

/// Generate one image with the global session. `None` on any failure.
pub fn txt2img(request: &GenerationRequest) -> Option<ImageData> {
    match session().generate(request) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("txt2img failed: {}", e);
            None
        }
    }
}

/// Free the global session's model. No-op when nothing is loaded.
pub fn free_model() {
    session().release();
}

/// Does not wait for a running load or generate.
pub fn is_model_loaded() -> bool {
    session::lock_status(&MODEL_STATUS).is_loaded
}

/// Current model status as JSON. Does not wait for a running load or generate.
pub fn model_status_json() -> String {
    let status = session::lock_status(&MODEL_STATUS).clone();
    serde_json::to_string(&status).unwrap_or_else(|e| {
        error!("Failed to serialize model status: {}", e);
        String::from("{}")
    })
}

// ============================================================================
// C API
// ============================================================================

unsafe fn c_str_arg<'a>(ptr: *const c_char, name: &str) -> Option<&'a str> {
    if ptr.is_null() {
        warn!("{} is null", name);
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("{} is not valid UTF-8: {}", name, e);
            None
        }
    }
}

/// Initialize logging. Optional; every other call works without it.
#[no_mangle]
pub extern "C" fn iia_init() -> c_int {
    util::init_logging();
    0
}

/// Library version, static string.
#[no_mangle]
pub extern "C" fn iia_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Load a model. `vae_path` may be null or empty.
///
/// # Safety
/// Non-null pointers must point to NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn iia_load_model(
    model_path: *const c_char,
    vae_path: *const c_char,
    n_threads: c_int,
) -> bool {
    let Some(model_path) = c_str_arg(model_path, "model_path") else {
        return false;
    };
    let vae_path = if vae_path.is_null() {
        ""
    } else {
        match c_str_arg(vae_path, "vae_path") {
            Some(s) => s,
            None => return false,
        }
    };

    load_model(model_path, vae_path, n_threads)
}

/// Generate one image. Returns the pixel buffer and writes its length to
/// `out_len`, or returns null. Release the buffer with `iia_free_image`.
///
/// # Safety
/// String pointers must be null or NUL-terminated; `out_len` must be null or
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn iia_txt2img(
    prompt: *const c_char,
    negative_prompt: *const c_char,
    cfg_scale: c_float,
    width: c_int,
    height: c_int,
    steps: c_int,
    seed: i64,
    out_len: *mut usize,
) -> *mut u8 {
    if out_len.is_null() {
        warn!("out_len is null");
        return std::ptr::null_mut();
    }
    *out_len = 0;

    let (Some(prompt), Some(negative_prompt)) = (
        c_str_arg(prompt, "prompt"),
        c_str_arg(negative_prompt, "negative_prompt"),
    ) else {
        return std::ptr::null_mut();
    };

    let request = GenerationRequest {
        prompt: prompt.to_string(),
        negative_prompt: negative_prompt.to_string(),
        cfg_scale,
        width,
        height,
        steps,
        seed,
    };

    match txt2img(&request) {
        Some(image) => {
            let buf = image.data.into_boxed_slice();
            *out_len = buf.len();
            Box::into_raw(buf) as *mut u8
        }
        None => std::ptr::null_mut(),
    }
}

/// Free a buffer returned by `iia_txt2img`.
///
/// # Safety
/// `data` and `len` must come from the same `iia_txt2img` call, once.
#[no_mangle]
pub unsafe extern "C" fn iia_free_image(data: *mut u8, len: usize) {
    if data.is_null() {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(data, len)));
}

/// Free the loaded model. Safe to call when nothing is loaded.
#[no_mangle]
pub extern "C" fn iia_free_model() {
    free_model();
}

#[no_mangle]
pub extern "C" fn iia_is_model_loaded() -> bool {
    is_model_loaded()
}

/// Model status as a JSON string. Release it with `iia_free_string`.
#[no_mangle]
pub extern "C" fn iia_model_status() -> *mut c_char {
    match CString::new(model_status_json()) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `s` must come from `iia_model_status`, once.
#[no_mangle]
pub unsafe extern "C" fn iia_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
