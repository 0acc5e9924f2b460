//! C-compatible FFI wrappers around codepane-editor.
//!
//! The native shell owns the WebView; this library owns the session state.
//! Everything the shell must act on (navigate, evaluate a script, show a
//! diagnostic, receive a pulled text) is queued and handed out as JSON by
//! `codepane_session_poll_event`. WebView callbacks are fed back through the
//! `codepane_session_navigation_*` and `codepane_session_deliver` functions.
//!
//! All functions use C strings for input/output. Callers must free returned
//! strings with `codepane_free_string`.
//!
//! All extern "C" functions are wrapped in `ffi_catch` to prevent Rust
//! panics from crossing the FFI boundary (which is undefined behavior).
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use codepane_core::{Appearance, BridgeSettings, Mode};
use codepane_editor::{
    BridgeError, Delivery, EmbeddedRuntime, LoadState, SessionEvent, SessionHandle,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Run `f` inside `catch_unwind`, logging the panic payload before returning the
/// fallback value.
fn ffi_catch<T>(fallback: T, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> T {
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            log::error!("FFI panic caught: {}", msg);
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_rust_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees `ptr` is a valid, null-terminated C string
    // whose memory remains valid for the duration of this call.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(String::from)
}

fn to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            log::warn!(
                "String contains interior NUL bytes, sanitizing ({} chars)",
                s.len()
            );
            let sanitized: String = s.chars().filter(|&c| c != '\0').collect();
            CString::new(sanitized).unwrap_or_default().into_raw()
        }
    }
}

/// 0 = delivered, 1 = queued until the editor finishes loading, -1 = error.
fn delivery_code(result: Result<Delivery, BridgeError>) -> i32 {
    match result {
        Ok(Delivery::Sent) => 0,
        Ok(Delivery::Queued) => 1,
        Err(_) => -1,
    }
}

// ---------------------------------------------------------------------------
// Memory management & setup
// ---------------------------------------------------------------------------

/// Free a string previously returned by a `codepane_*` function.
#[no_mangle]
pub extern "C" fn codepane_free_string(s: *mut c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if !s.is_null() {
                // SAFETY: `s` was produced by `CString::into_raw` in `to_c_string`.
                unsafe {
                    drop(CString::from_raw(s));
                }
            }
        }),
    )
}

/// Install the `env_logger` backend (filtered by `RUST_LOG`). Safe to call
/// more than once.
#[no_mangle]
pub extern "C" fn codepane_init_logging() {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let _ = env_logger::try_init();
        }),
    )
}

/// Ensure the editor document is extracted to the platform data directory.
///
/// Returns the extraction path on success or `ERROR:<message>` on failure.
/// The caller must free the returned string with `codepane_free_string`.
#[no_mangle]
pub extern "C" fn codepane_ensure_assets_extracted() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match codepane_editor::assets::ensure_assets_extracted() {
            Ok(path) => to_c_string(&path.to_string_lossy()),
            Err(e) => to_c_string(&format!("ERROR:{}", e)),
        }),
    )
}

/// Return the JSON Schema of the bridge protocol. The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_protocol_schema() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_c_string(&codepane_editor::schema::protocol_schema_json())),
    )
}

/// Editor mode tag (`plain`, `json`, `xml`) for a file name, suitable for
/// `codepane_session_new`. The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_mode_for_path(path: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let path = to_rust_str(path).unwrap_or_default();
            to_c_string(codepane_core::util::mode_from_path(&path).as_str())
        }),
    )
}

/// Editor mode tag for an HTTP `Content-Type` value (parameters and
/// `+json`/`+xml` suffixes are understood). The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_mode_for_content_type(content_type: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let content_type = to_rust_str(content_type).unwrap_or_default();
            to_c_string(codepane_core::util::mode_from_content_type(&content_type).as_str())
        }),
    )
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Requests from the session to the native shell.
#[derive(Debug)]
enum HostEvent {
    Load { cycle: u64 },
    Evaluate { script: String },
    Unload,
    PullResolved(Result<String, BridgeError>),
}

/// The WebView, as the session sees it: every request becomes a host event.
struct HostRuntime {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl EmbeddedRuntime for HostRuntime {
    fn load(&mut self, cycle: u64) {
        let _ = self.tx.send(HostEvent::Load { cycle });
    }

    fn evaluate_script(&mut self, script: &str) {
        let _ = self.tx.send(HostEvent::Evaluate {
            script: script.to_string(),
        });
    }

    fn unload(&mut self) {
        let _ = self.tx.send(HostEvent::Unload);
    }
}

struct SessionInner {
    handle: SessionHandle,
    runtime: Runtime,
    host_tx: mpsc::UnboundedSender<HostEvent>,
    host_rx: parking_lot::Mutex<mpsc::UnboundedReceiver<HostEvent>>,
    session_rx: parking_lot::Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    document_uri: Option<String>,
    bootstrap: String,
}

impl SessionInner {
    fn host_event_json(&self, event: HostEvent) -> serde_json::Value {
        match event {
            HostEvent::Load { cycle } => serde_json::json!({
                "type": "load",
                "cycle": cycle,
                "uri": self.document_uri,
                "bootstrap": self.bootstrap,
            }),
            HostEvent::Evaluate { script } => serde_json::json!({
                "type": "evaluate",
                "script": script,
            }),
            HostEvent::Unload => serde_json::json!({ "type": "unload" }),
            HostEvent::PullResolved(Ok(text)) => serde_json::json!({
                "type": "pullResolved",
                "text": text,
            }),
            HostEvent::PullResolved(Err(e)) => serde_json::json!({
                "type": "pullResolved",
                "error": e.to_string(),
            }),
        }
    }
}

fn session_event_json(event: SessionEvent) -> serde_json::Value {
    match event {
        SessionEvent::StateChanged { state, cycle } => serde_json::json!({
            "type": "stateChanged",
            "state": state,
            "cycle": cycle,
        }),
        SessionEvent::Acknowledged { cycle } => serde_json::json!({
            "type": "acknowledged",
            "cycle": cycle,
        }),
        SessionEvent::ContentChanged { revision } => serde_json::json!({
            "type": "contentChanged",
            "revision": revision,
        }),
        SessionEvent::Diagnostic(e) => serde_json::json!({
            "type": "diagnostic",
            "message": e.to_string(),
        }),
    }
}

/// Global registry mapping opaque handle addresses to session data.
/// The mutex guards map access only; each session has its own lock-free
/// command queue.
fn session_registry() -> &'static parking_lot::Mutex<HashMap<usize, Arc<SessionInner>>> {
    static REGISTRY: OnceLock<parking_lot::Mutex<HashMap<usize, Arc<SessionInner>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Look up a session by handle. Returns `default` when the handle is null,
/// freed, or was never issued.
fn with_session<T>(
    handle: *mut CodepaneSession,
    default: T,
    f: impl FnOnce(&SessionInner) -> T,
) -> T {
    if handle.is_null() {
        return default;
    }
    let key = handle as usize;
    let guard = session_registry().lock();
    match guard.get(&key) {
        Some(inner) => {
            let inner = Arc::clone(inner);
            drop(guard); // Release lock before calling f
            f(&inner)
        }
        None => {
            log::warn!("Attempted to use invalid or freed editor session handle");
            default
        }
    }
}

/// Opaque handle token for the C API. Never dereferenced; only used as a key.
pub struct CodepaneSession {
    _private: (),
}

fn new_session(
    text: String,
    mode: Mode,
    settings: &BridgeSettings,
    document_uri: Option<String>,
) -> *mut CodepaneSession {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create Tokio runtime for editor session: {}", e);
            return std::ptr::null_mut();
        }
    };

    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let (handle, session_rx) = {
        let _guard = runtime.enter();
        SessionHandle::spawn(
            HostRuntime {
                tx: host_tx.clone(),
            },
            text,
            mode,
            settings,
        )
    };

    let inner = Arc::new(SessionInner {
        handle,
        runtime,
        host_tx,
        host_rx: parking_lot::Mutex::new(host_rx),
        session_rx: parking_lot::Mutex::new(session_rx),
        document_uri,
        bootstrap: codepane_editor::assets::bootstrap_script(settings),
    });

    // Allocate a stable address to use as an opaque handle key
    let handle = Box::into_raw(Box::new(CodepaneSession { _private: () }));
    session_registry().lock().insert(handle as usize, inner);
    handle
}

/// Create an editor session for `text` in `mode` (`"plain"`, `"json"` or
/// `"xml"`). Bridge settings are read from the user config.
///
/// The first polled event is a `load` request carrying the document URI and
/// a bootstrap script to install at document start. Returns null on invalid
/// input. The caller must free the handle with `codepane_session_free`.
#[no_mangle]
pub extern "C" fn codepane_session_new(
    text: *const c_char,
    mode: *const c_char,
) -> *mut CodepaneSession {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let text = match to_rust_str(text) {
                Some(s) => s,
                None => return std::ptr::null_mut(),
            };
            let mode = match to_rust_str(mode).map(|m| m.parse::<Mode>()) {
                Some(Ok(m)) => m,
                Some(Err(e)) => {
                    log::warn!("{}", e);
                    return std::ptr::null_mut();
                }
                None => return std::ptr::null_mut(),
            };

            let settings = codepane_core::settings::load();
            let document_uri = codepane_editor::assets::ensure_assets_extracted()
                .and_then(|dir| codepane_editor::assets::editor_document_uri(&dir))
                .map_err(|e| log::error!("Editor document unavailable: {}", e))
                .ok();

            new_session(text, mode, &settings, document_uri)
        }),
    )
}

/// Report that navigation for `cycle` finished. Returns 0, or -1 on error.
#[no_mangle]
pub extern "C" fn codepane_session_navigation_finished(
    handle: *mut CodepaneSession,
    cycle: u64,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |inner| {
                match inner.handle.navigation_finished(cycle) {
                    Ok(()) => 0,
                    Err(_) => -1,
                }
            })
        }),
    )
}

/// Report that navigation for `cycle` failed with `diagnostic`.
/// Returns 0, or -1 on error.
#[no_mangle]
pub extern "C" fn codepane_session_navigation_failed(
    handle: *mut CodepaneSession,
    cycle: u64,
    diagnostic: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let diagnostic =
                to_rust_str(diagnostic).unwrap_or_else(|| "navigation failed".to_string());
            with_session(handle, -1, |inner| {
                match inner.handle.navigation_failed(cycle, &diagnostic) {
                    Ok(()) => 0,
                    Err(_) => -1,
                }
            })
        }),
    )
}

/// Hand over a message body posted by the page's script handler.
/// Returns 0, or -1 on error. Decode failures surface as `diagnostic` events.
#[no_mangle]
pub extern "C" fn codepane_session_deliver(
    handle: *mut CodepaneSession,
    raw: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let raw = match to_rust_str(raw) {
                Some(s) => s,
                None => return -1,
            };
            with_session(handle, -1, |inner| match inner.handle.deliver(&raw) {
                Ok(()) => 0,
                Err(_) => -1,
            })
        }),
    )
}

/// Replace the editor text. Returns 0 if delivered, 1 if queued until the
/// editor loads, -1 on error.
#[no_mangle]
pub extern "C" fn codepane_session_set_text(
    handle: *mut CodepaneSession,
    text: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let text = match to_rust_str(text) {
                Some(s) => s,
                None => return -1,
            };
            with_session(handle, -1, |inner| {
                delivery_code(inner.runtime.block_on(inner.handle.set_text(text)))
            })
        }),
    )
}

/// Switch the language mode. Same return codes as `codepane_session_set_text`.
#[no_mangle]
pub extern "C" fn codepane_session_set_mode(
    handle: *mut CodepaneSession,
    mode: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let mode = match to_rust_str(mode).and_then(|m| m.parse::<Mode>().ok()) {
                Some(m) => m,
                None => return -1,
            };
            with_session(handle, -1, |inner| {
                delivery_code(inner.runtime.block_on(inner.handle.set_mode(mode)))
            })
        }),
    )
}

/// Switch between `"dark"` and `"light"`. Same return codes as
/// `codepane_session_set_text`.
#[no_mangle]
pub extern "C" fn codepane_session_set_appearance(
    handle: *mut CodepaneSession,
    appearance: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let appearance = match to_rust_str(appearance).as_deref() {
                Some("dark") => Appearance::Dark,
                Some("light") => Appearance::Light,
                _ => return -1,
            };
            with_session(handle, -1, |inner| {
                delivery_code(inner.runtime.block_on(inner.handle.set_appearance(appearance)))
            })
        }),
    )
}

/// Return the host's current copy of the text. The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_session_get_text(handle: *mut CodepaneSession) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |inner| {
                match inner.runtime.block_on(inner.handle.text()) {
                    Ok(text) => to_c_string(&text),
                    Err(_) => std::ptr::null_mut(),
                }
            })
        }),
    )
}

/// Return `{"text","mode","revision","state","cycle"}` as JSON, or
/// `{"error":...}` if the session has ended. Null on an invalid handle.
/// The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_session_snapshot(handle: *mut CodepaneSession) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |inner| {
                let json = match inner.runtime.block_on(inner.handle.snapshot()) {
                    Ok(snapshot) => serde_json::json!({
                        "text": snapshot.text,
                        "mode": snapshot.mode,
                        "revision": snapshot.revision,
                        "state": snapshot.state,
                        "cycle": snapshot.cycle,
                    }),
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                to_c_string(&json.to_string())
            })
        }),
    )
}

/// Start a new load (the only way out of a failed load). Returns the cycle
/// number now in flight, or -1 on error.
#[no_mangle]
pub extern "C" fn codepane_session_reload(handle: *mut CodepaneSession) -> i64 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |inner| {
                match inner.runtime.block_on(inner.handle.reload()) {
                    Ok(cycle) => cycle as i64,
                    Err(_) => -1,
                }
            })
        }),
    )
}

/// Ask the editor for its current text without blocking the caller. The
/// outcome arrives as a `pullResolved` event carrying `text` or `error`.
/// Returns 0, or -1 on an invalid handle.
#[no_mangle]
pub extern "C" fn codepane_session_request_pull(handle: *mut CodepaneSession) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |inner| {
                let session = inner.handle.clone();
                let tx = inner.host_tx.clone();
                inner.runtime.spawn(async move {
                    let result = session.pull_text().await;
                    let _ = tx.send(HostEvent::PullResolved(result));
                });
                0
            })
        }),
    )
}

/// Poll for the next event. Shell requests (`load`, `evaluate`, `unload`,
/// `pullResolved`) come before session notifications (`stateChanged`,
/// `acknowledged`, `contentChanged`, `diagnostic`).
///
/// Returns a JSON string, or null if nothing is pending. The caller must free
/// the returned string with `codepane_free_string`.
#[no_mangle]
pub extern "C" fn codepane_session_poll_event(handle: *mut CodepaneSession) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |inner| {
                if let Ok(event) = inner.host_rx.lock().try_recv() {
                    return to_c_string(&inner.host_event_json(event).to_string());
                }
                match inner.session_rx.lock().try_recv() {
                    Ok(event) => to_c_string(&session_event_json(event).to_string()),
                    Err(_) => std::ptr::null_mut(),
                }
            })
        }),
    )
}

/// Return the load state name (`unloaded`, `loading`, `ready`, `failed`).
/// The caller must free it.
#[no_mangle]
pub extern "C" fn codepane_session_state(handle: *mut CodepaneSession) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |inner| {
                let state = inner
                    .runtime
                    .block_on(inner.handle.state())
                    .unwrap_or(LoadState::Unloaded);
                to_c_string(&state.to_string())
            })
        }),
    )
}

/// Destroy a session. Pending pulls are cancelled and queued messages
/// dropped; late WebView callbacks for this handle are ignored.
#[no_mangle]
pub extern "C" fn codepane_session_free(handle: *mut CodepaneSession) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if handle.is_null() {
                return;
            }
            let key = handle as usize;
            // Remove from registry. The Arc keeps the session alive if another
            // thread is currently using it via with_session.
            let inner = {
                let mut reg = session_registry().lock();
                reg.remove(&key)
            };
            match inner {
                Some(inner) => inner.handle.close(),
                None => {
                    log::warn!("codepane_session_free called on already-freed handle");
                    return; // Don't double-free
                }
            }
            // SAFETY: `handle` was allocated by `Box::into_raw` in `new_session`.
            // The registry removal above ensures this only happens once per handle.
            unsafe {
                drop(Box::from_raw(handle));
            }
        }),
    );
}
