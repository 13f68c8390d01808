//! FFI bindings for RoboFace Flux
//!
//! This module provides C-compatible functions for driving the engine from a
//! host application (the sensor and rendering side). The host owns the clock:
//! every push and tick carries its engine time in milliseconds.
//!
//! Strings returned by this module are allocated here and must be freed by
//! the caller using `roboface_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::config::EngineConfig;
use crate::encoder::StateEncoder;
use crate::error::EngineError;
use crate::normalizer::SampleRejection;
use crate::pipeline::EmotionProcessor;
use crate::types::{MotionSample, ProximitySample, RotationSample, SoundSample};

/// Sample accepted
pub const ROBOFACE_OK: i32 = 0;
/// Sample rejected by validation; see `roboface_last_error`
pub const ROBOFACE_REJECTED: i32 = 1;
/// Bad arguments (null pointers)
pub const ROBOFACE_ERROR: i32 = -1;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Map a push result onto a status code
fn push_status<T>(result: Result<T, SampleRejection>) -> i32 {
    match result {
        Ok(_) => ROBOFACE_OK,
        Err(rejection) => {
            set_last_error(&EngineError::from(rejection).to_string());
            ROBOFACE_REJECTED
        }
    }
}

// ============================================================================
// Processor Lifecycle
// ============================================================================

/// Opaque handle to an EmotionProcessor
pub struct RobofaceProcessorHandle {
    processor: EmotionProcessor,
    encoder: StateEncoder,
}

impl RobofaceProcessorHandle {
    fn new(processor: EmotionProcessor) -> Self {
        Self {
            processor,
            encoder: StateEncoder::new(),
        }
    }
}

/// Create a processor with default tuning, started at `start_ms`.
///
/// # Safety
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `roboface_processor_free`.
#[no_mangle]
pub unsafe extern "C" fn roboface_processor_new(start_ms: u64) -> *mut RobofaceProcessorHandle {
    clear_last_error();
    let handle = Box::new(RobofaceProcessorHandle::new(EmotionProcessor::new(start_ms)));
    Box::into_raw(handle)
}

/// Create a processor from a (possibly partial) JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `roboface_processor_free`.
/// - Returns NULL on error; call `roboface_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn roboface_processor_new_with_config(
    config_json: *const c_char,
    start_ms: u64,
) -> *mut RobofaceProcessorHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let processor = EngineConfig::from_json(&json_str)
        .and_then(|config| EmotionProcessor::with_config(config, start_ms));
    match processor {
        Ok(processor) => Box::into_raw(Box::new(RobofaceProcessorHandle::new(processor))),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn roboface_processor_free(processor: *mut RobofaceProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

// ============================================================================
// Sensor Input
// ============================================================================

/// Push a raw accelerometer sample (m/s²).
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - Returns `ROBOFACE_OK`, `ROBOFACE_REJECTED` or `ROBOFACE_ERROR`.
#[no_mangle]
pub unsafe extern "C" fn roboface_push_motion(
    processor: *mut RobofaceProcessorHandle,
    x: f32,
    y: f32,
    z: f32,
    t_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    push_status(handle.processor.on_motion(&MotionSample::new(x, y, z), t_ms))
}

/// Push a gyroscope Z rate (rad/s).
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
#[no_mangle]
pub unsafe extern "C" fn roboface_push_rotation(
    processor: *mut RobofaceProcessorHandle,
    z: f32,
    t_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    push_status(handle.processor.on_rotation(&RotationSample { z }, t_ms))
}

/// Push a proximity reading. A `max_range` of 0 selects the default range.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
#[no_mangle]
pub unsafe extern "C" fn roboface_push_proximity(
    processor: *mut RobofaceProcessorHandle,
    distance: f32,
    max_range: f32,
    t_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    let sample = ProximitySample {
        distance,
        max_range,
    };
    push_status(handle.processor.on_proximity(&sample, t_ms))
}

/// Push the mean absolute amplitude of one microphone window.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
#[no_mangle]
pub unsafe extern "C" fn roboface_push_sound_level(
    processor: *mut RobofaceProcessorHandle,
    mean_abs_amplitude: f32,
    t_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    let sample = SoundSample { mean_abs_amplitude };
    push_status(handle.processor.on_sound(&sample, t_ms))
}

/// Push a raw 16-bit mono PCM window.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - `samples` must point to `len` readable `i16` values, or be NULL when `len` is 0.
#[no_mangle]
pub unsafe extern "C" fn roboface_push_pcm(
    processor: *mut RobofaceProcessorHandle,
    samples: *const i16,
    len: usize,
    t_ms: u64,
) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    let pcm: &[i16] = if len == 0 {
        &[]
    } else if samples.is_null() {
        set_last_error("Null PCM buffer pointer");
        return ROBOFACE_ERROR;
    } else {
        slice::from_raw_parts(samples, len)
    };
    push_status(handle.processor.on_pcm(pcm, t_ms))
}

// ============================================================================
// Evaluation and Output
// ============================================================================

/// Run one evaluation tick and return the resulting emotion code.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - Returns -1 on a null processor.
#[no_mangle]
pub unsafe extern "C" fn roboface_tick(processor: *mut RobofaceProcessorHandle, t_ms: u64) -> i32 {
    clear_last_error();
    let Some(handle) = processor.as_mut() else {
        set_last_error("Null processor pointer");
        return ROBOFACE_ERROR;
    };
    handle.processor.tick(t_ms);
    handle.processor.current_emotion().code()
}

/// Current emotion code (Idle=0 … Surprised=8).
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - Returns -1 on a null processor.
#[no_mangle]
pub unsafe extern "C" fn roboface_current_emotion(processor: *const RobofaceProcessorHandle) -> i32 {
    clear_last_error();
    match processor.as_ref() {
        Some(handle) => handle.processor.current_emotion().code(),
        None => {
            set_last_error("Null processor pointer");
            ROBOFACE_ERROR
        }
    }
}

/// Encode the current state as a roboface.state.v1 JSON payload.
///
/// # Safety
/// - `processor` must be a valid pointer returned by a `roboface_processor_new*` function.
/// - Returns a newly allocated string that must be freed with `roboface_free_string`.
/// - Returns NULL on error; call `roboface_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn roboface_snapshot_json(
    processor: *const RobofaceProcessorHandle,
) -> *mut c_char {
    clear_last_error();
    let Some(handle) = processor.as_ref() else {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    };

    let snapshot = handle.processor.snapshot();
    match handle
        .encoder
        .encode_to_line(&snapshot, handle.processor.last_seen_ms())
    {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by RoboFace functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a RoboFace function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn roboface_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next RoboFace function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn roboface_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn roboface_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmotionState;

    unsafe fn last_error() -> String {
        let error = roboface_last_error();
        assert!(!error.is_null());
        CStr::from_ptr(error).to_str().unwrap().to_string()
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = roboface_processor_new(0);
            assert!(!processor.is_null());
            assert_eq!(
                roboface_current_emotion(processor),
                EmotionState::Curious.code()
            );

            assert_eq!(roboface_push_motion(processor, 12.0, 8.0, 9.8, 100), ROBOFACE_OK);
            assert_eq!(roboface_push_motion(processor, 12.0, 8.0, 9.8, 600), ROBOFACE_OK);
            assert_eq!(roboface_tick(processor, 1_000), EmotionState::Angry.code());

            let json = roboface_snapshot_json(processor);
            assert!(!json.is_null());
            let value: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(json).to_str().unwrap()).unwrap();
            assert_eq!(value["emotion"], "angry");
            assert_eq!(value["metrics"]["shake_count"], 2);
            assert_eq!(value["engine_time_ms"], 1_000);
            roboface_free_string(json);

            roboface_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_all_inputs() {
        unsafe {
            let processor = roboface_processor_new(0);
            assert_eq!(roboface_push_rotation(processor, 0.5, 10), ROBOFACE_OK);
            assert_eq!(roboface_push_sound_level(processor, 600.0, 20), ROBOFACE_OK);

            let pcm: [i16; 4] = [100, -100, 200, -200];
            assert_eq!(
                roboface_push_pcm(processor, pcm.as_ptr(), pcm.len(), 30),
                ROBOFACE_OK
            );

            assert_eq!(roboface_push_proximity(processor, 0.0, 0.0, 40), ROBOFACE_OK);
            assert_eq!(roboface_tick(processor, 500), EmotionState::Sleep.code());
            roboface_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_rejected_sample() {
        unsafe {
            let processor = roboface_processor_new(0);
            assert_eq!(
                roboface_push_motion(processor, f32::NAN, 0.0, 0.0, 10),
                ROBOFACE_REJECTED
            );
            let message = last_error();
            assert!(message.starts_with("Invalid sample:"), "{message}");
            assert!(message.contains("not finite"));

            assert_eq!(
                roboface_push_pcm(processor, ptr::null(), 0, 20),
                ROBOFACE_REJECTED
            );
            assert_eq!(
                roboface_push_pcm(processor, ptr::null(), 4, 30),
                ROBOFACE_ERROR
            );

            // Success clears the previous error
            assert_eq!(roboface_push_rotation(processor, 0.1, 40), ROBOFACE_OK);
            assert!(roboface_last_error().is_null());
            roboface_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_config() {
        unsafe {
            let config = CString::new(r#"{"emotion":{"min_dwell_ms":0}}"#).unwrap();
            let processor = roboface_processor_new_with_config(config.as_ptr(), 0);
            assert!(!processor.is_null());
            roboface_processor_free(processor);

            let bad = CString::new(r#"{"filter":{"tilt_alpha":7}}"#).unwrap();
            let processor = roboface_processor_new_with_config(bad.as_ptr(), 0);
            assert!(processor.is_null());
            assert!(last_error().contains("tilt_alpha"));

            let processor = roboface_processor_new_with_config(ptr::null(), 0);
            assert!(processor.is_null());
        }
    }

    #[test]
    fn test_ffi_null_processor() {
        unsafe {
            assert_eq!(
                roboface_push_motion(ptr::null_mut(), 0.0, 0.0, 0.0, 0),
                ROBOFACE_ERROR
            );
            assert_eq!(roboface_tick(ptr::null_mut(), 0), ROBOFACE_ERROR);
            assert!(roboface_snapshot_json(ptr::null()).is_null());
            roboface_processor_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = roboface_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::ROBOFACE_VERSION);
        }
    }
}
