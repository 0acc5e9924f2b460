use fs2::FileExt;
use std::path::{Path, PathBuf};

use codepane_core::{BridgeSettings, Mode};

pub const EDITOR_HTML: &str = include_str!("../web/editor.html");
pub const BRIDGE_JS: &str = include_str!("../web/bridge.js");

/// Bumped with the crate so a new build re-extracts its own copy.
pub const ASSETS_VERSION: &str = env!("CARGO_PKG_VERSION");

const FILES: &[(&str, &str)] = &[("editor.html", EDITOR_HTML), ("bridge.js", BRIDGE_JS)];

/// Ensure the editor document is extracted to the local data directory.
///
/// Returns the extraction directory
/// (e.g. `~/.local/share/codepane/web/0.3.0/` on Linux).
pub fn ensure_assets_extracted() -> Result<PathBuf, String> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| "Cannot determine data home directory".to_string())?;
    ensure_assets_extracted_in(&data_dir.join("codepane").join("web"))
}

/// Extract into `<base>/<ASSETS_VERSION>/`, holding an exclusive lock on
/// `<base>/.extract.lock` so concurrent hosts don't interleave writes.
pub fn ensure_assets_extracted_in(base: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(base)
        .map_err(|e| format!("Failed to create assets directory: {}", e))?;

    let lock_file = std::fs::File::create(base.join(".extract.lock"))
        .map_err(|e| format!("Failed to create lock file: {}", e))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| format!("Failed to acquire extraction lock: {}", e))?;

    let target = base.join(ASSETS_VERSION);
    let marker = target.join(".complete");

    if let Ok(version) = std::fs::read_to_string(&marker) {
        if version.trim() == ASSETS_VERSION {
            return Ok(target);
        }
        log::info!("Editor assets version mismatch, re-extracting...");
        let _ = std::fs::remove_dir_all(&target);
    }

    log::info!("Extracting editor assets v{} to {:?}", ASSETS_VERSION, target);
    std::fs::create_dir_all(&target)
        .map_err(|e| format!("Failed to create {:?}: {}", target, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o700));
    }

    for (name, contents) in FILES {
        let path = target.join(name);
        std::fs::write(&path, contents)
            .map_err(|e| format!("Failed to write {:?}: {}", path, e))?;
    }

    // Marker last: an interrupted extraction is retried next time.
    std::fs::write(&marker, ASSETS_VERSION)
        .map_err(|e| format!("Failed to write completion marker: {}", e))?;

    Ok(target)
}

/// `file://` URI of the editor document inside an extraction directory.
pub fn editor_document_uri(dir: &Path) -> Result<String, String> {
    codepane_core::util::file_path_to_uri(&dir.join("editor.html"))
        .ok_or_else(|| format!("Cannot build a file URI for {:?}", dir))
}

/// Script to install at document start, before `bridge.js` runs, telling it
/// which message handler to post to, which function to expose, and the MIME
/// type the editor should use for each mode.
pub fn bootstrap_script(settings: &BridgeSettings) -> String {
    let mime_types: serde_json::Map<String, serde_json::Value> = Mode::ALL
        .into_iter()
        .map(|mode| (mode.as_str().to_string(), mode.mime_type().into()))
        .collect();
    let config = serde_json::json!({
        "handler": settings.message_handler,
        "receive": settings.receive_function,
        "mimeTypes": mime_types,
    });
    format!("window.codepaneConfig = {};", config)
}
