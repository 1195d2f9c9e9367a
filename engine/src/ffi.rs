//! FFI layer for the mobile client.
//!
//! Lets the offline client preview a reconciliation against a cached copy of
//! the cloud records before anything is written. Only the pure comparison is
//! exposed; migration needs the cloud store and stays server-side.
//!
//! # Memory Management
//!
//! - Strings returned by `orchard_*` functions are allocated by Rust
//! - Caller must free them with `orchard_string_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    error::Result, ComparePolicy, Error, RawTreeRecord, Reconciler, RecordSet,
    ReconciliationResult, SourceOrigin,
};
use std::ffi::{c_char, CStr, CString};

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `orchard_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::from(c"{\"error\":\"string contained null bytes\"}").into_raw(),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn parse_set(origin: SourceOrigin, farm_id: &str, json: &str) -> Result<RecordSet> {
    let raw: Vec<RawTreeRecord> = serde_json::from_str(json)
        .map_err(|e| Error::InvalidPayload(format!("{} records: {}", origin, e)))?;
    let records = raw
        .into_iter()
        .map(|r| r.normalize(origin))
        .collect::<Result<Vec<_>>>()?;
    RecordSet::from_records(origin, farm_id, records)
}

fn reconcile_json(
    farm_id: &str,
    mobile_json: &str,
    cloud_json: &str,
    policy_json: Option<&str>,
) -> Result<ReconciliationResult> {
    let policy = match policy_json {
        Some(json) => serde_json::from_str::<ComparePolicy>(json)
            .map_err(|e| Error::InvalidPayload(format!("policy: {}", e)))?,
        None => ComparePolicy::default(),
    };
    let mobile = parse_set(SourceOrigin::Mobile, farm_id, mobile_json)?;
    let cloud = parse_set(SourceOrigin::Cloud, farm_id, cloud_json)?;
    Ok(Reconciler::new(policy).compare(farm_id, &mobile, &cloud))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconcile two record sets for one farm.
///
/// # Arguments
/// - `farm_id`: Farm identifier
/// - `mobile_json`: JSON array of records from the mobile store
/// - `cloud_json`: JSON array of records from the cloud store
/// - `policy_json`: JSON `ComparePolicy`, or null for the default policy
///
/// Records use the stored shape:
/// `{"id": "...", "farmId": "...", "updatedAt": 0, "fields": {...}}`.
///
/// # Returns
/// JSON string: `{"ok": ReconciliationResult}` or `{"error": "message"}`
///
/// # Safety
/// - `farm_id`, `mobile_json` and `cloud_json` must be valid null-terminated C strings or null
/// - `policy_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `orchard_string_free`
#[no_mangle]
pub unsafe extern "C" fn orchard_reconcile(
    farm_id: *const c_char,
    mobile_json: *const c_char,
    cloud_json: *const c_char,
    policy_json: *const c_char,
) -> *mut c_char {
    let farm_id = match from_c_string(farm_id) {
        Some(s) if !s.trim().is_empty() => s,
        _ => return to_c_string(FfiResult::<()>::err("invalid farm id").to_json()),
    };

    let mobile = match from_c_string(mobile_json) {
        Some(s) => s,
        None => return to_c_string(FfiResult::<()>::err("invalid mobile JSON").to_json()),
    };

    let cloud = match from_c_string(cloud_json) {
        Some(s) => s,
        None => return to_c_string(FfiResult::<()>::err("invalid cloud JSON").to_json()),
    };

    let policy = from_c_string(policy_json);

    match reconcile_json(&farm_id, &mobile, &cloud, policy.as_deref()) {
        Ok(result) => to_c_string(FfiResult::ok(result).to_json()),
        Err(e) => to_c_string(FfiResult::<()>::err(e.to_string()).to_json()),
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from an `orchard_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn orchard_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string, do not free.
#[no_mangle]
pub extern "C" fn orchard_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}
