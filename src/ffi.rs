//! FFI bindings for Portal Telemetry
//!
//! This module provides C-compatible functions for embedding the collector in
//! a host that is not written in Rust. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `telemetry_free_string`.
//!
//! The host supplies its key-value storage through [`TelemetryStoreCallbacks`].

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::error::TelemetryError;
use crate::signal::{HostSignal, NavigationContext};
use crate::store::{KeyValueStore, MemoryStore};
use crate::types::Payload;

/// Return code for a successful store callback
pub const TELEMETRY_STORE_OK: i32 = 0;

/// Return code a `set` callback uses to report the host's storage quota is full
pub const TELEMETRY_STORE_QUOTA_EXCEEDED: i32 = -2;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

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

/// Parse an optional JSON object argument; NULL means an empty payload
unsafe fn payload_arg(json: *const c_char) -> Result<Payload, String> {
    if json.is_null() {
        return Ok(Payload::new());
    }
    let raw = cstr_to_string(json).ok_or("Invalid payload string pointer")?;
    serde_json::from_str::<Payload>(&raw)
        .map_err(|e| format!("Payload must be a JSON object: {}", e))
}

// ============================================================================
// Host storage
// ============================================================================

/// Host key-value store, as C function pointers.
///
/// - `get` returns the stored value or NULL when the key is absent. The
///   returned string stays owned by the host and only has to remain valid
///   until the callback is invoked again.
/// - `set` and `remove` return `TELEMETRY_STORE_OK` on success,
///   `TELEMETRY_STORE_QUOTA_EXCEEDED` when storage is full, any other value on
///   failure.
///
/// `ctx` is passed through untouched to every callback.
#[repr(C)]
pub struct TelemetryStoreCallbacks {
    pub ctx: *mut c_void,
    pub get: Option<unsafe extern "C" fn(ctx: *mut c_void, key: *const c_char) -> *const c_char>,
    pub set: Option<
        unsafe extern "C" fn(ctx: *mut c_void, key: *const c_char, value: *const c_char) -> i32,
    >,
    pub remove: Option<unsafe extern "C" fn(ctx: *mut c_void, key: *const c_char) -> i32>,
}

type GetFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *const c_char;
type SetFn = unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> i32;
type RemoveFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> i32;

/// [`KeyValueStore`] forwarding to host callbacks
struct CallbackStore {
    ctx: *mut c_void,
    get: GetFn,
    set: SetFn,
    remove: RemoveFn,
}

// The host promises its context may be used from whichever thread owns the
// collector handle.
unsafe impl Send for CallbackStore {}

impl CallbackStore {
    fn from_callbacks(callbacks: &TelemetryStoreCallbacks) -> Option<Self> {
        Some(Self {
            ctx: callbacks.ctx,
            get: callbacks.get?,
            set: callbacks.set?,
            remove: callbacks.remove?,
        })
    }
}

fn c_key(key: &str) -> Result<CString, TelemetryError> {
    CString::new(key).map_err(|_| TelemetryError::Storage(format!("key {:?} contains NUL", key)))
}

fn check_rc(rc: i32, op: &str, key: &str, value_len: usize) -> Result<(), TelemetryError> {
    match rc {
        TELEMETRY_STORE_OK => Ok(()),
        TELEMETRY_STORE_QUOTA_EXCEEDED => Err(TelemetryError::QuotaExceeded {
            key: key.to_string(),
            needed: key.len() + value_len,
            available: 0,
        }),
        other => Err(TelemetryError::Storage(format!(
            "host {} for {} failed with code {}",
            op, key, other
        ))),
    }
}

impl KeyValueStore for CallbackStore {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
        let c_key = c_key(key)?;
        let value = unsafe { (self.get)(self.ctx, c_key.as_ptr()) };
        if value.is_null() {
            return Ok(None);
        }
        let value = unsafe { CStr::from_ptr(value) };
        value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| TelemetryError::Storage(format!("value for {} is not UTF-8", key)))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError> {
        let c_key = c_key(key)?;
        let c_value = CString::new(value)
            .map_err(|_| TelemetryError::Storage(format!("value for {} contains NUL", key)))?;
        let rc = unsafe { (self.set)(self.ctx, c_key.as_ptr(), c_value.as_ptr()) };
        check_rc(rc, "set", key, value.len())
    }

    fn remove(&mut self, key: &str) -> Result<(), TelemetryError> {
        let c_key = c_key(key)?;
        let rc = unsafe { (self.remove)(self.ctx, c_key.as_ptr()) };
        check_rc(rc, "remove", key, 0)
    }
}

// ============================================================================
// Collector API
// ============================================================================

/// Opaque handle to a Collector
pub struct TelemetryCollectorHandle {
    collector: Collector,
}

/// Create a new Collector and record the initial page view.
///
/// # Safety
/// - `config_json` and `navigation_json` must be valid null-terminated C
///   strings or NULL (NULL selects the default config / an empty navigation
///   context).
/// - `callbacks` must be NULL or point to a valid `TelemetryStoreCallbacks`.
///   When it is NULL or any callback is missing, an in-memory store is used.
/// - Returns a pointer that must be freed with `telemetry_collector_free`.
/// - Returns NULL on error; call `telemetry_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_new(
    config_json: *const c_char,
    navigation_json: *const c_char,
    callbacks: *const TelemetryStoreCallbacks,
) -> *mut TelemetryCollectorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        CollectorConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match CollectorConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let navigation = if navigation_json.is_null() {
        NavigationContext::default()
    } else {
        let json_str = match cstr_to_string(navigation_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid navigation string pointer");
                return ptr::null_mut();
            }
        };
        match serde_json::from_str::<NavigationContext>(&json_str) {
            Ok(navigation) => navigation,
            Err(e) => {
                set_last_error(&format!("Invalid navigation context: {}", e));
                return ptr::null_mut();
            }
        }
    };

    let host_store = callbacks.as_ref().and_then(CallbackStore::from_callbacks);
    let store: Box<dyn KeyValueStore> = match host_store {
        Some(store) => Box::new(store),
        None => Box::new(MemoryStore::new()),
    };

    match Collector::new(config, store, navigation) {
        Ok(collector) => Box::into_raw(Box::new(TelemetryCollectorHandle { collector })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a Collector.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_free(handle: *mut TelemetryCollectorHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Feed one host signal (JSON) to the collector.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - `signal_json` must be a valid null-terminated C string.
/// - Returns 0 when the signal was dispatched, -1 when it could not be parsed.
///   Signals whose data the collector rejects are logged and still return 0.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_handle_signal(
    handle: *mut TelemetryCollectorHandle,
    signal_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return -1;
    }

    let handle = &mut *handle;

    let json_str = match cstr_to_string(signal_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid signal string pointer");
            return -1;
        }
    };

    match HostSignal::from_json(&json_str) {
        Ok(signal) => {
            handle.collector.handle_signal(signal);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Record a custom event.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - `name` must be a valid null-terminated C string.
/// - `payload_json` must be a JSON object string or NULL.
/// - Returns 0 on success, -1 on invalid arguments.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_track_event(
    handle: *mut TelemetryCollectorHandle,
    name: *const c_char,
    payload_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return -1;
    }

    let handle = &mut *handle;

    let name_str = match cstr_to_string(name) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event name pointer");
            return -1;
        }
    };

    match payload_arg(payload_json) {
        Ok(payload) => {
            handle.collector.track_event(&name_str, payload);
            0
        }
        Err(msg) => {
            set_last_error(&msg);
            -1
        }
    }
}

/// Record a conversion-funnel step.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - `funnel` and `step` must be valid null-terminated C strings.
/// - `payload_json` must be a JSON object string or NULL.
/// - Returns 0 on success, -1 on invalid arguments.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_track_funnel_step(
    handle: *mut TelemetryCollectorHandle,
    funnel: *const c_char,
    step: *const c_char,
    payload_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return -1;
    }

    let handle = &mut *handle;

    let funnel_str = match cstr_to_string(funnel) {
        Some(s) => s,
        None => {
            set_last_error("Invalid funnel name pointer");
            return -1;
        }
    };

    let step_str = match cstr_to_string(step) {
        Some(s) => s,
        None => {
            set_last_error("Invalid step name pointer");
            return -1;
        }
    };

    match payload_arg(payload_json) {
        Ok(payload) => {
            handle
                .collector
                .track_funnel_step(&funnel_str, &step_str, payload);
            0
        }
        Err(msg) => {
            set_last_error(&msg);
            -1
        }
    }
}

/// Export the complete in-memory state as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - Returns a newly allocated string that must be freed with `telemetry_free_string`.
/// - Returns NULL on error; call `telemetry_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_export(
    handle: *const TelemetryCollectorHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;

    match serde_json::to_string(&handle.collector.export_data()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Summarize the collector's state as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - Returns a newly allocated string that must be freed with `telemetry_free_string`.
/// - Returns NULL on error; call `telemetry_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_summary(
    handle: *const TelemetryCollectorHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;

    match serde_json::to_string(&handle.collector.summary()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Append the current page's heatmap batch to the host store now.
///
/// Only needed when the config sets `heatmap_flush_every` above 1.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - Returns 0 on success, -1 on a null handle. Storage failures are logged.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_flush_heatmap(
    handle: *mut TelemetryCollectorHandle,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return -1;
    }

    (*handle).collector.flush_heatmap();
    0
}

/// Remove both persisted keys from the host store; in-memory state is kept.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `telemetry_collector_new`.
/// - Returns 0 on success, -1 on a null handle. Storage failures are logged.
#[no_mangle]
pub unsafe extern "C" fn telemetry_collector_clear_storage(
    handle: *mut TelemetryCollectorHandle,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null collector pointer");
        return -1;
    }

    (*handle).collector.clear_storage();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a telemetry function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a telemetry function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn telemetry_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next telemetry call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn telemetry_last_error() -> *const c_char {
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
pub unsafe extern "C" fn telemetry_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
