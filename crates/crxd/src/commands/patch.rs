//! `crxd patch` command implementation.

use std::path::PathBuf;

use clap::Args;
use crxd_config::{CliSettings, Config};
use crxd_manifest::{BackgroundChange, PatchReport, patch_manifest};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the patch command.
#[derive(Args)]
pub(crate) struct PatchArgs {
    /// Path to configuration file (default: auto-discover crxd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Build output directory containing manifest.json (overrides config).
    #[arg(short, long)]
    dist_dir: Option<PathBuf>,
}

impl PatchArgs {
    /// Execute the patch command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the manifest cannot be patched.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            dist_dir: self.dist_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let dist_dir = &config.extension_resolved.dist_dir;

        let report = patch_manifest(dist_dir)?;
        for line in describe(&report) {
            output.info(&line);
        }
        output.success(&format!(
            "Patched {}",
            config.extension_resolved.manifest_path().display()
        ));

        Ok(())
    }
}

/// Human-readable summary of a patch run.
fn describe(report: &PatchReport) -> Vec<String> {
    if !report.changed() {
        return vec!["Manifest already patched".to_owned()];
    }

    let mut lines = Vec::new();
    if report.resources_added {
        lines.push("Added web_accessible_resources entry".to_owned());
    }
    if report.content_script_added {
        lines.push("Added content bridge script".to_owned());
    }
    match &report.background {
        BackgroundChange::Created => lines.push("Added background bridge worker".to_owned()),
        BackgroundChange::Wrapped { original } => {
            lines.push(format!("Wrapped background worker {original}"));
        }
        BackgroundChange::Unchanged => {}
    }
    lines
}
