// ============================================================================
// JNI Wrappers for the Diffusion Bridge
// ============================================================================
//
// Package: com.canc.iia.NativeLib (Kotlin `object`, so every call receives
// the singleton instance as `thiz`)
// ============================================================================

#![allow(non_snake_case, clippy::too_many_arguments)]

use jni::objects::{JObject, JString};
use jni::sys::{
    jboolean, jbyteArray, jfloat, jint, jlong, jstring, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_6,
};
use jni::{JNIEnv, JavaVM};
use std::ffi::c_void;
use tracing::{info, warn};

use crate::engine::GenerationRequest;
use crate::image_utils::ImageData;

/// Called by `System.loadLibrary("iia_native")`.
#[no_mangle]
pub extern "C" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::util::init_logging();
    info!("iia native bridge {} loaded", env!("CARGO_PKG_VERSION"));
    JNI_VERSION_1_6
}

/// Java string to Rust, `None` for null or undecodable input.
fn get_string(env: &mut JNIEnv, s: &JString, name: &str) -> Option<String> {
    if s.is_null() {
        warn!("{} is null", name);
        return None;
    }
    match env.get_string(s) {
        Ok(java_str) => Some(java_str.into()),
        Err(e) => {
            warn!("Failed to read {}: {:?}", name, e);
            None
        }
    }
}

fn to_jboolean(b: bool) -> jboolean {
    if b {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn to_byte_array(env: &mut JNIEnv, bytes: &[u8]) -> jbyteArray {
    match env.byte_array_from_slice(bytes) {
        Ok(array) => array.into_raw(),
        Err(e) => {
            warn!("Failed to allocate Java byte array: {:?}", e);
            std::ptr::null_mut()
        }
    }
}

fn generate(
    env: &mut JNIEnv,
    prompt: &JString,
    negative_prompt: &JString,
    cfg_scale: jfloat,
    width: jint,
    height: jint,
    steps: jint,
    seed: jlong,
) -> Option<ImageData> {
    // Skips string conversion when nothing is loaded. Reads the status record
    // only; `crate::txt2img` re-checks under the session lock.
    if !crate::is_model_loaded() {
        return None;
    }

    let prompt = get_string(env, prompt, "prompt")?;
    let negative_prompt = get_string(env, negative_prompt, "negativePrompt")?;

    crate::txt2img(&GenerationRequest {
        prompt,
        negative_prompt,
        cfg_scale,
        width,
        height,
        steps,
        seed,
    })
}

// ============================================================================
// Model Loading and Management
// ============================================================================

/// Kotlin: `external fun loadModel(modelPath: String, vaePath: String, threads: Int): Boolean`
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_loadModel(
    mut env: JNIEnv,
    _thiz: JObject,
    model_path: JString,
    vae_path: JString,
    threads: jint,
) -> jboolean {
    let Some(model_path) = get_string(&mut env, &model_path, "modelPath") else {
        return JNI_FALSE;
    };
    let Some(vae_path) = get_string(&mut env, &vae_path, "vaePath") else {
        return JNI_FALSE;
    };

    to_jboolean(crate::load_model(&model_path, &vae_path, threads))
}

/// Kotlin: `external fun freeModel()`
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_freeModel(_env: JNIEnv, _thiz: JObject) {
    crate::free_model();
}

/// Kotlin: `external fun isModelLoaded(): Boolean`
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_isModelLoaded(
    _env: JNIEnv,
    _thiz: JObject,
) -> jboolean {
    to_jboolean(crate::is_model_loaded())
}

/// Kotlin: `external fun getModelStatus(): String`
///
/// JSON: `{"current_model":..,"loading_status":"not_loaded|loading|ready|error","is_loaded":..,"error_message":..}`
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_getModelStatus(
    env: JNIEnv,
    _thiz: JObject,
) -> jstring {
    match env.new_string(crate::model_status_json()) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

// ============================================================================
// Image Generation
// ============================================================================

/// Kotlin: `external fun txt2img(prompt: String, negativePrompt: String,
/// cfgScale: Float, width: Int, height: Int, steps: Int, seed: Long): ByteArray?`
///
/// Returns raw RGB bytes (width * height * 3), or null on failure.
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_txt2img(
    mut env: JNIEnv,
    _thiz: JObject,
    prompt: JString,
    negative_prompt: JString,
    cfg_scale: jfloat,
    width: jint,
    height: jint,
    steps: jint,
    seed: jlong,
) -> jbyteArray {
    match generate(
        &mut env,
        &prompt,
        &negative_prompt,
        cfg_scale,
        width,
        height,
        steps,
        seed,
    ) {
        Some(image) => to_byte_array(&mut env, &image.data),
        None => std::ptr::null_mut(),
    }
}

/// Same as `txt2img` but returns RGBA_8888 bytes (width * height * 4) ready
/// for `Bitmap.copyPixelsFromBuffer`.
#[no_mangle]
pub extern "C" fn Java_com_canc_iia_NativeLib_txt2imgRgba(
    mut env: JNIEnv,
    _thiz: JObject,
    prompt: JString,
    negative_prompt: JString,
    cfg_scale: jfloat,
    width: jint,
    height: jint,
    steps: jint,
    seed: jlong,
) -> jbyteArray {
    let Some(image) = generate(
        &mut env,
        &prompt,
        &negative_prompt,
        cfg_scale,
        width,
        height,
        steps,
        seed,
    ) else {
        return std::ptr::null_mut();
    };

    match image.to_rgba() {
        Ok(rgba) => to_byte_array(&mut env, &rgba),
        Err(e) => {
            warn!("RGBA conversion failed: {}", e);
            std::ptr::null_mut()
        }
    }
}
