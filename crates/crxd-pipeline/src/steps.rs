//! Concrete pipeline steps.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crxd_manifest::{BridgeSettings, emit_bridge_scripts, patch_manifest};

use crate::{Step, StepError};

/// Maximum stderr bytes kept in a failure.
const MAX_STDERR_BYTES: usize = 4096;

/// Runs an external command in the project directory.
#[derive(Clone, Debug)]
pub struct CommandStep {
    name: String,
    argv: Vec<String>,
    cwd: PathBuf,
    requires: Vec<PathBuf>,
}

impl CommandStep {
    #[must_use]
    pub fn new(name: impl Into<String>, argv: Vec<String>, cwd: PathBuf) -> Self {
        Self {
            name: name.into(),
            argv,
            cwd,
            requires: Vec::new(),
        }
    }

    /// Fail with `MissingInput` unless `path` exists when the step runs.
    #[must_use]
    pub fn requires(mut self, path: PathBuf) -> Self {
        self.requires.push(path);
        self
    }
}

impl Step for CommandStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<(), StepError> {
        if let Some(missing) = self.requires.iter().find(|path| !path.exists()) {
            return Err(StepError::MissingInput {
                step: self.name.clone(),
                path: missing.clone(),
            });
        }

        let Some((program, args)) = self.argv.split_first() else {
            return Err(StepError::EmptyCommand {
                step: self.name.clone(),
            });
        };

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StepError::Spawn {
                step: self.name.clone(),
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = &output.stderr[..output.stderr.len().min(MAX_STDERR_BYTES)];
            return Err(StepError::Failed {
                step: self.name.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(stderr).trim().to_owned(),
            });
        }

        tracing::debug!(step = %self.name, program = %program, "Command finished");
        Ok(())
    }
}

/// Writes the reload bridge scripts into the build output.
#[derive(Clone, Debug)]
pub struct BridgeStep {
    dist_dir: PathBuf,
    settings: BridgeSettings,
}

impl BridgeStep {
    #[must_use]
    pub fn new(dist_dir: PathBuf, settings: BridgeSettings) -> Self {
        Self { dist_dir, settings }
    }
}

impl Step for BridgeStep {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn run(&self) -> Result<(), StepError> {
        emit_bridge_scripts(&self.dist_dir, &self.settings)?;
        Ok(())
    }
}

/// Patches the built manifest for dev mode.
#[derive(Clone, Debug)]
pub struct ManifestStep {
    dist_dir: PathBuf,
}

impl ManifestStep {
    #[must_use]
    pub fn new(dist_dir: PathBuf) -> Self {
        Self { dist_dir }
    }
}

impl Step for ManifestStep {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn run(&self) -> Result<(), StepError> {
        let report = patch_manifest(&self.dist_dir)?;
        if report.changed() {
            tracing::debug!(?report, "Manifest updated");
        }
        Ok(())
    }
}
