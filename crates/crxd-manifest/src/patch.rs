//! Dev-mode manifest patching.
//!
//! Injects the reload bridge into a built `manifest.json`:
//!
//! - `web_accessible_resources` gains an entry exposing `src/dev/*`
//! - `content_scripts` gains the content bridge, run at `document_start`
//! - `background` either becomes the background bridge or is wrapped so the
//!   bridge loads alongside the original service worker
//!
//! Every step checks for its own earlier output, so patching twice is the
//! same as patching once.

use std::path::Path;

use serde_json::{Map, Value, json};

use crate::ManifestError;

/// Glob exposing the bridge scripts to web pages.
pub const DEV_RESOURCES: &str = "src/dev/*";
/// Content bridge script, relative to the build output.
pub const CONTENT_SCRIPT: &str = "src/dev/content-dev.js";
/// Background bridge script, relative to the build output.
pub const BACKGROUND_SCRIPT: &str = "src/dev/background-dev.js";
/// Wrapper that loads the background bridge and the original worker.
pub const BACKGROUND_WRAPPER: &str = "background-wrapper.js";

/// What happened to the `background` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundChange {
    /// No service worker existed; the bridge became the worker.
    Created,
    /// The original worker was wrapped.
    Wrapped {
        /// Service worker the wrapper imports after the bridge.
        original: String,
    },
    /// Already patched.
    Unchanged,
}

/// Summary of a patch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchReport {
    pub resources_added: bool,
    pub content_script_added: bool,
    pub background: BackgroundChange,
}

impl PatchReport {
    /// Whether the manifest was modified at all.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.resources_added
            || self.content_script_added
            || self.background != BackgroundChange::Unchanged
    }
}

/// Patch `<dist_dir>/manifest.json` in place.
///
/// Writes `<dist_dir>/background-wrapper.js` when an existing worker is wrapped.
///
/// # Errors
///
/// Returns an error if the manifest is missing, unreadable, not valid JSON,
/// or has an unexpected shape.
pub fn patch_manifest(dist_dir: &Path) -> Result<PatchReport, ManifestError> {
    let manifest_path = dist_dir.join("manifest.json");
    if !manifest_path.exists() {
        return Err(ManifestError::NotFound(manifest_path));
    }

    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| ManifestError::io(e, &manifest_path))?;
    let mut manifest: Value = serde_json::from_str(&content)?;

    let report = patch_value(&mut manifest)?;

    if let BackgroundChange::Wrapped { original } = &report.background {
        let wrapper_path = dist_dir.join(BACKGROUND_WRAPPER);
        std::fs::write(&wrapper_path, wrapper_source(original))
            .map_err(|e| ManifestError::io(e, &wrapper_path))?;
        tracing::debug!(original = %original, "Wrapped background service worker");
    }

    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .map_err(|e| ManifestError::io(e, &manifest_path))?;
    tracing::info!(path = %manifest_path.display(), changed = report.changed(), "Manifest patched");

    Ok(report)
}

/// Apply the dev-mode patch to a parsed manifest.
///
/// # Errors
///
/// Returns `ManifestError::Invalid` if a touched field has the wrong JSON type.
pub fn patch_value(manifest: &mut Value) -> Result<PatchReport, ManifestError> {
    let root = manifest
        .as_object_mut()
        .ok_or_else(|| ManifestError::Invalid("manifest root must be an object".to_owned()))?;

    Ok(PatchReport {
        resources_added: add_web_accessible_resources(root)?,
        content_script_added: add_content_script(root)?,
        background: patch_background(root)?,
    })
}

/// Source of the background wrapper module.
#[must_use]
pub fn wrapper_source(original: &str) -> String {
    format!("import './{BACKGROUND_SCRIPT}';\nimport './{original}';")
}

fn add_web_accessible_resources(root: &mut Map<String, Value>) -> Result<bool, ManifestError> {
    let resources = array_field(root, "web_accessible_resources")?;

    let present = resources
        .iter()
        .any(|entry| lists(entry, "resources", DEV_RESOURCES));
    if !present {
        resources.push(json!({
            "resources": [DEV_RESOURCES],
            "matches": ["<all_urls>"],
        }));
    }
    Ok(!present)
}

fn add_content_script(root: &mut Map<String, Value>) -> Result<bool, ManifestError> {
    let scripts = array_field(root, "content_scripts")?;

    let present = scripts.iter().any(|entry| lists(entry, "js", CONTENT_SCRIPT));
    if !present {
        scripts.push(json!({
            "matches": ["<all_urls>"],
            "js": [CONTENT_SCRIPT],
            "run_at": "document_start",
        }));
    }
    Ok(!present)
}

fn patch_background(root: &mut Map<String, Value>) -> Result<BackgroundChange, ManifestError> {
    let background = root
        .entry("background")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| ManifestError::Invalid("background must be an object".to_owned()))?;

    let current = match background.get("service_worker") {
        None => None,
        Some(Value::String(worker)) => Some(worker.clone()),
        Some(_) => {
            return Err(ManifestError::Invalid(
                "background.service_worker must be a string".to_owned(),
            ));
        }
    };

    match current.as_deref() {
        None => {
            background.insert("service_worker".to_owned(), json!(BACKGROUND_SCRIPT));
            background.entry("type").or_insert_with(|| json!("module"));
            Ok(BackgroundChange::Created)
        }
        Some(BACKGROUND_WRAPPER | BACKGROUND_SCRIPT) => Ok(BackgroundChange::Unchanged),
        Some(original) => {
            let original = original.trim_start_matches("./").to_owned();
            background.insert("service_worker".to_owned(), json!(BACKGROUND_WRAPPER));
            // The wrapper uses static imports.
            background.insert("type".to_owned(), json!("module"));
            Ok(BackgroundChange::Wrapped { original })
        }
    }
}

/// Get or create an array field on the manifest root.
fn array_field<'a>(
    root: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Vec<Value>, ManifestError> {
    root.entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| ManifestError::Invalid(format!("{key} must be an array")))
}

/// Whether `entry[key]` is an array containing `needle`.
fn lists(entry: &Value, key: &str, needle: &str) -> bool {
    entry
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|item| item.as_str() == Some(needle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_patch_empty_manifest() {
        let mut manifest = json!({ "manifest_version": 3, "name": "Alerts" });

        let report = patch_value(&mut manifest).unwrap();

        assert_eq!(
            report,
            PatchReport {
                resources_added: true,
                content_script_added: true,
                background: BackgroundChange::Created,
            }
        );
        assert_eq!(
            manifest,
            json!({
                "manifest_version": 3,
                "name": "Alerts",
                "web_accessible_resources": [
                    { "resources": ["src/dev/*"], "matches": ["<all_urls>"] }
                ],
                "content_scripts": [
                    {
                        "matches": ["<all_urls>"],
                        "js": ["src/dev/content-dev.js"],
                        "run_at": "document_start"
                    }
                ],
                "background": {
                    "service_worker": "src/dev/background-dev.js",
                    "type": "module"
                }
            })
        );
    }

    #[test]
    fn test_patch_keeps_existing_entries() {
        let mut manifest = json!({
            "content_scripts": [{ "matches": ["https://*/*"], "js": ["content.js"] }],
            "web_accessible_resources": [{ "resources": ["img/*"], "matches": ["<all_urls>"] }],
        });

        patch_value(&mut manifest).unwrap();

        assert_eq!(manifest["content_scripts"].as_array().unwrap().len(), 2);
        assert_eq!(manifest["content_scripts"][0]["js"][0], "content.js");
        assert_eq!(manifest["web_accessible_resources"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_patch_wraps_existing_service_worker() {
        let mut manifest = json!({
            "background": { "service_worker": "service-worker-loader.js", "type": "module" }
        });

        let report = patch_value(&mut manifest).unwrap();

        assert_eq!(
            report.background,
            BackgroundChange::Wrapped {
                original: "service-worker-loader.js".to_owned()
            }
        );
        assert_eq!(
            manifest["background"]["service_worker"],
            "background-wrapper.js"
        );
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut manifest = json!({
            "background": { "service_worker": "sw.js" }
        });
        patch_value(&mut manifest).unwrap();
        let once = manifest.clone();

        let report = patch_value(&mut manifest).unwrap();

        assert!(!report.changed());
        assert_eq!(manifest, once);
    }

    #[test]
    fn test_patch_rejects_wrong_shapes() {
        let mut not_object = json!([1, 2]);
        assert!(matches!(
            patch_value(&mut not_object),
            Err(ManifestError::Invalid(_))
        ));

        let mut bad_scripts = json!({ "content_scripts": "nope" });
        let err = patch_value(&mut bad_scripts).unwrap_err();
        assert!(err.to_string().contains("content_scripts"));
    }

    #[test]
    fn test_wrapper_source() {
        assert_eq!(
            wrapper_source("service-worker-loader.js"),
            "import './src/dev/background-dev.js';\nimport './service-worker-loader.js';"
        );
    }

    #[test]
    fn test_patch_manifest_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"name":"Alerts","background":{"service_worker":"sw.js"}}"#,
        )
        .unwrap();

        patch_manifest(dir.path()).unwrap();

        let written = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        let manifest: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(manifest["background"]["service_worker"], BACKGROUND_WRAPPER);
        // Key order is preserved
        assert!(written.find("\"name\"").unwrap() < written.find("\"background\"").unwrap());
        assert!(written.contains("\n  \"name\""));

        let wrapper = std::fs::read_to_string(dir.path().join(BACKGROUND_WRAPPER)).unwrap();
        assert!(wrapper.contains("import './sw.js';"));
    }

    #[test]
    fn test_patch_manifest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = patch_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }
}
