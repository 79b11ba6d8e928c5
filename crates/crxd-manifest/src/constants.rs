//! Generated constants module.
//!
//! Projects that compile their own bridge sources import the bound port and
//! the protocol values from this file.

use std::path::Path;

use crxd_protocol::{RELOAD, UPDATE_CONTENT};

use crate::ManifestError;

/// Render the constants module.
#[must_use]
pub fn render_constants(port: u16, extension_name: &str) -> String {
    let quote = |s: &str| serde_json::Value::from(s).to_string();
    format!(
        "export const DEV_SERVER_PORT = {port};\n\
         export const EXTENSION_NAME = {};\n\
         export const UPDATE_CONTENT = {};\n\
         export const RELOAD = {};\n",
        quote(extension_name),
        quote(UPDATE_CONTENT),
        quote(RELOAD),
    )
}

/// Write the constants module to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_constants(path: &Path, port: u16, extension_name: &str) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(e, parent))?;
    }
    std::fs::write(path, render_constants(port, extension_name))
        .map_err(|e| ManifestError::io(e, path))?;
    tracing::info!(path = %path.display(), port, "Wrote dev constants");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_constants() {
        assert_eq!(
            render_constants(8788, "web-update-alerts"),
            "export const DEV_SERVER_PORT = 8788;\n\
             export const EXTENSION_NAME = \"web-update-alerts\";\n\
             export const UPDATE_CONTENT = \"UPDATE_CONTENT\";\n\
             export const RELOAD = \"RELOAD\";\n"
        );
    }

    #[test]
    fn test_write_constants_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src/dev/constants.ts");

        write_constants(&path, 9000, "ext").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("export const DEV_SERVER_PORT = 9000;"));
    }
}
