//! Dev-mode extension artifacts for crxd.
//!
//! - [`patch_manifest`] injects the reload bridge into a built manifest
//! - [`emit_bridge_scripts`] writes the bridge scripts into the build output
//! - [`write_constants`] generates the constants module carrying the bound port

mod bridge;
mod constants;
mod patch;

use std::path::{Path, PathBuf};

pub use bridge::{
    BridgeSettings, emit_bridge_scripts, render_background_script, render_content_script,
};
pub use constants::{render_constants, write_constants};
pub use patch::{
    BACKGROUND_SCRIPT, BACKGROUND_WRAPPER, BackgroundChange, CONTENT_SCRIPT, DEV_RESOURCES,
    PatchReport, patch_manifest, patch_value, wrapper_source,
};

/// Manifest and artifact error.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The built manifest does not exist yet.
    #[error("manifest.json not found at {}, build the extension first", .0.display())]
    NotFound(PathBuf),
    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The manifest is not valid JSON.
    #[error("Invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A field the patch touches has an unexpected type.
    #[error("Unexpected manifest shape: {0}")]
    Invalid(String),
}

impl ManifestError {
    pub(crate) fn io(source: std::io::Error, path: &Path) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
