//! FFI layer for host-language bindings.
//!
//! This module provides C-compatible functions that can be called from any
//! language with a C FFI. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `lens_*` functions are allocated by Rust
//! - Caller must free them with `lens_string_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure
//!
//! The engine configuration is read from the environment on every call
//! (see [`EngineConfig::from_env`]).

use crate::{
    config::EngineConfig,
    patch::{translate_with, PatchOp},
    pipeline::{Direction, Engine, LensContext},
    Lens,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

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

impl<T: serde::Serialize> From<Result<T, String>> for FfiResult<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => FfiResult::ok(value),
            Err(message) => FfiResult::err(message),
        }
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `lens_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .map(CString::into_raw)
            .unwrap_or(ptr::null_mut()),
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

/// Parse a JSON argument, naming it in the error message.
unsafe fn parse_arg<T: DeserializeOwned>(ptr: *const c_char, what: &str) -> Result<T, String> {
    let raw = from_c_string(ptr).ok_or_else(|| format!("invalid {} JSON", what))?;
    serde_json::from_str(&raw).map_err(|e| format!("{} parse error: {}", what, e))
}

fn engine() -> Result<Engine, String> {
    EngineConfig::from_env()
        .map(Engine::new)
        .map_err(|e| e.to_string())
}

fn respond<T: serde::Serialize>(result: Result<T, String>) -> *mut c_char {
    to_c_string(FfiResult::from(result).to_json())
}

// ============================================================================
// Document Migration
// ============================================================================

/// Apply a lens to a document.
///
/// # Arguments
/// - `lens_json`: JSON string of the lens (array of operators)
/// - `doc_json`: JSON string of the document
/// - `schema_json`: JSON string of the document's schema
///
/// # Returns
/// JSON string: `{"ok": Outcome}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `lens_string_free`
#[no_mangle]
pub unsafe extern "C" fn lens_apply(
    lens_json: *const c_char,
    doc_json: *const c_char,
    schema_json: *const c_char,
) -> *mut c_char {
    let result = (|| {
        let lens: Lens = parse_arg(lens_json, "lens")?;
        let doc: Value = parse_arg(doc_json, "document")?;
        let schema: Value = parse_arg(schema_json, "schema")?;
        engine()?
            .apply(&lens, doc, schema)
            .map_err(|e| e.to_string())
    })();
    respond(result)
}

/// Revert a lens on a document.
///
/// # Arguments
/// - `lens_json`: JSON string of the lens
/// - `doc_json`: JSON string of the migrated document
/// - `schema_json`: JSON string of the migrated document's schema
/// - `context_json`: `context` returned by `lens_apply`, or null
///
/// # Returns
/// JSON string: `{"ok": Outcome}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings; `context_json`
///   may be null
/// - Caller must free the returned string with `lens_string_free`
#[no_mangle]
pub unsafe extern "C" fn lens_revert(
    lens_json: *const c_char,
    doc_json: *const c_char,
    schema_json: *const c_char,
    context_json: *const c_char,
) -> *mut c_char {
    let result = (|| {
        let lens: Lens = parse_arg(lens_json, "lens")?;
        let doc: Value = parse_arg(doc_json, "document")?;
        let schema: Value = parse_arg(schema_json, "schema")?;
        let engine = engine()?;
        let outcome = if context_json.is_null() {
            engine.revert(&lens, doc, schema)
        } else {
            let context: LensContext = parse_arg(context_json, "context")?;
            engine.revert_with(&lens, doc, schema, &context)
        };
        outcome.map_err(|e| e.to_string())
    })();
    respond(result)
}

// ============================================================================
// Schemas and Patches
// ============================================================================

/// Project a schema through a lens.
///
/// # Returns
/// JSON string: `{"ok": Schema}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `lens_string_free`
#[no_mangle]
pub unsafe extern "C" fn lens_project_schema(
    lens_json: *const c_char,
    schema_json: *const c_char,
) -> *mut c_char {
    let result = (|| {
        let lens: Lens = parse_arg(lens_json, "lens")?;
        let schema: Value = parse_arg(schema_json, "schema")?;
        engine()?.project(&lens, schema).map_err(|e| e.to_string())
    })();
    respond(result)
}

/// Translate a patch across a lens.
///
/// # Arguments
/// - `lens_json`: JSON string of the lens
/// - `patch_json`: JSON string of the patch (`{"op", "path", "value"}`)
/// - `reverse`: translate from the destination side back to the source
///
/// # Returns
/// JSON string: `{"ok": Translation}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `lens_string_free`
#[no_mangle]
pub unsafe extern "C" fn lens_translate_patch(
    lens_json: *const c_char,
    patch_json: *const c_char,
    reverse: bool,
) -> *mut c_char {
    let result = (|| {
        let lens: Lens = parse_arg(lens_json, "lens")?;
        let patch: PatchOp = parse_arg(patch_json, "patch")?;
        let engine = engine()?;
        let direction = if reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        Ok::<_, String>(translate_with(engine.config(), &lens, &patch, direction))
    })();
    respond(result)
}

// ============================================================================
// Utility
// ============================================================================

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `lens_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn lens_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn lens_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cstring(value: Value) -> CString {
        CString::new(value.to_string()).unwrap()
    }

    unsafe fn take_json(result: *mut c_char) -> Value {
        let text = CStr::from_ptr(result).to_str().unwrap().to_string();
        lens_string_free(result);
        serde_json::from_str(&text).unwrap()
    }

    fn test_lens() -> CString {
        cstring(json!([
            {"rename": {"source": "title", "destination": "name"}},
            {"remove": {"name": "draft", "type": "boolean"}}
        ]))
    }

    fn test_schema() -> CString {
        cstring(json!({
            "type": "object",
            "properties": {"title": {"type": "string"}, "draft": {"type": "boolean"}}
        }))
    }

    #[test]
    fn ffi_apply_and_revert() {
        unsafe {
            let lens = test_lens();
            let doc = cstring(json!({"title": "Notes", "draft": true}));
            let schema = test_schema();

            let applied = take_json(lens_apply(lens.as_ptr(), doc.as_ptr(), schema.as_ptr()));
            let outcome = &applied["ok"];
            assert_eq!(outcome["value"], json!({"name": "Notes"}));
            assert_eq!(outcome["schema"]["properties"], json!({"name": {"type": "string"}}));

            let migrated = cstring(outcome["value"].clone());
            let migrated_schema = cstring(outcome["schema"].clone());
            let context = cstring(outcome["context"].clone());
            let reverted = take_json(lens_revert(
                lens.as_ptr(),
                migrated.as_ptr(),
                migrated_schema.as_ptr(),
                context.as_ptr(),
            ));
            assert_eq!(reverted["ok"]["value"], json!({"title": "Notes", "draft": true}));

            // Without context the default is used and the outcome is degraded.
            let reverted = take_json(lens_revert(
                lens.as_ptr(),
                migrated.as_ptr(),
                migrated_schema.as_ptr(),
                ptr::null(),
            ));
            assert_eq!(reverted["ok"]["value"]["draft"], json!(false));
            assert_eq!(
                reverted["ok"]["degradations"][0]["reason"]["kind"],
                json!("missingStoredDefault")
            );
        }
    }

    #[test]
    fn ffi_project_schema() {
        unsafe {
            let lens = test_lens();
            let schema = test_schema();
            let projected = take_json(lens_project_schema(lens.as_ptr(), schema.as_ptr()));
            assert_eq!(projected["ok"]["properties"], json!({"name": {"type": "string"}}));
        }
    }

    #[test]
    fn ffi_translate_patch() {
        unsafe {
            let lens = test_lens();
            let patch = cstring(json!({"op": "set", "path": "/name", "value": "x"}));
            let out = take_json(lens_translate_patch(lens.as_ptr(), patch.as_ptr(), true));
            assert_eq!(
                out["ok"]["patches"],
                json!([{"op": "set", "path": "/title", "value": "x"}])
            );
        }
    }

    #[test]
    fn ffi_version() {
        unsafe {
            let version = lens_version();
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }

    #[test]
    fn ffi_error_handling() {
        unsafe {
            let schema = test_schema();
            let doc = cstring(json!({}));

            // Null lens pointer
            let result = take_json(lens_apply(ptr::null(), doc.as_ptr(), schema.as_ptr()));
            assert_eq!(result["error"], json!("invalid lens JSON"));

            // Invalid lens
            let bad = CString::new(r#"[{"explode": {}}]"#).unwrap();
            let result = take_json(lens_apply(bad.as_ptr(), doc.as_ptr(), schema.as_ptr()));
            assert!(result["error"].as_str().unwrap().starts_with("lens parse error"));

            // Operator failure
            let lens = cstring(json!([{"hoist": {"host": "missing", "name": "x"}}]));
            let result = take_json(lens_apply(lens.as_ptr(), doc.as_ptr(), schema.as_ptr()));
            assert_eq!(result["error"], json!("hoist: missing field 'missing' at /"));
        }
    }
}
