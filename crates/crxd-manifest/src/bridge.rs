//! Reload bridge scripts.
//!
//! The content bridge is the browser-side client of the update channel. The
//! background bridge restarts the extension when the content bridge asks.
//! Both are rendered from templates with the bound port baked in.

use std::path::{Path, PathBuf};

use crxd_protocol::{RELOAD, UPDATE_CONTENT, connect_host};

use crate::ManifestError;
use crate::patch::{BACKGROUND_SCRIPT, CONTENT_SCRIPT};

const CONTENT_TEMPLATE: &str = include_str!("../assets/content-dev.js");
const BACKGROUND_TEMPLATE: &str = include_str!("../assets/background-dev.js");

/// Values baked into the bridge scripts.
#[derive(Clone, Debug)]
pub struct BridgeSettings {
    /// Host the channel is bound on.
    pub host: String,
    /// Port the channel actually bound.
    pub port: u16,
    /// Extension identifier used in the upgrade path.
    pub extension_name: String,
    /// Liveness ping cadence in milliseconds.
    pub ping_interval_ms: u64,
}

/// JavaScript string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Render the content bridge.
#[must_use]
pub fn render_content_script(settings: &BridgeSettings) -> String {
    CONTENT_TEMPLATE
        .replace("__DEV_SERVER_HOST__", &js_string(connect_host(&settings.host)))
        .replace("__DEV_SERVER_PORT__", &settings.port.to_string())
        .replace("__EXTENSION_NAME__", &js_string(&settings.extension_name))
        .replace("__UPDATE_CONTENT__", &js_string(UPDATE_CONTENT))
        .replace("__RELOAD__", &js_string(RELOAD))
        .replace("__PING_INTERVAL_MS__", &settings.ping_interval_ms.to_string())
}

/// Render the background bridge.
#[must_use]
pub fn render_background_script() -> String {
    BACKGROUND_TEMPLATE.replace("__RELOAD__", &js_string(RELOAD))
}

/// Write both bridge scripts under `dist_dir`, returning the written paths.
///
/// # Errors
///
/// Returns an error if the output directory or a script cannot be written.
pub fn emit_bridge_scripts(
    dist_dir: &Path,
    settings: &BridgeSettings,
) -> Result<Vec<PathBuf>, ManifestError> {
    let outputs = [
        (dist_dir.join(CONTENT_SCRIPT), render_content_script(settings)),
        (dist_dir.join(BACKGROUND_SCRIPT), render_background_script()),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (path, source) in outputs {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(e, parent))?;
        }
        std::fs::write(&path, source).map_err(|e| ManifestError::io(e, &path))?;
        written.push(path);
    }

    tracing::debug!(count = written.len(), "Bridge scripts written");
    Ok(written)
}
