//! Build pipeline for crxd.
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s run on a blocking thread
//! after every debounced change. [`BuildProcess`] supervises the long-running
//! bundler in watch mode and decides when its initial build is done.
//!
//! ```ignore
//! let pipeline = Arc::new(Pipeline::new(vec![
//!     Box::new(BridgeStep::new(dist_dir.clone(), settings)),
//!     Box::new(ManifestStep::new(dist_dir)),
//! ]));
//! Arc::clone(&pipeline).run_blocking().await?;
//! ```

mod process;
mod steps;

use std::path::PathBuf;
use std::sync::Arc;

use crxd_manifest::ManifestError;

pub use process::{BuildError, BuildProcess, Readiness};
pub use steps::{BridgeStep, CommandStep, ManifestStep};

/// Step error.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// A file the step reads does not exist.
    #[error("{step}: required input {} is missing", path.display())]
    MissingInput { step: String, path: PathBuf },
    /// The step has no program to run.
    #[error("{step}: command is empty")]
    EmptyCommand { step: String },
    /// The program could not be started.
    #[error("{step}: failed to run '{program}': {source}")]
    Spawn {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The program exited unsuccessfully.
    #[error("{step}: exited with {status}: {stderr}")]
    Failed {
        step: String,
        status: String,
        stderr: String,
    },
    /// Writing or patching an artifact failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The blocking task running the pipeline panicked.
    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One unit of work in a rebuild cycle.
pub trait Step: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Run the step to completion.
    fn run(&self) -> Result<(), StepError>;
}

/// Ordered steps, stopping at the first failure.
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Step names in run order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.name())
    }

    /// Run every step in order on the current thread.
    ///
    /// # Errors
    ///
    /// Returns the first step error; later steps do not run.
    pub fn run(&self) -> Result<(), StepError> {
        for step in &self.steps {
            tracing::debug!(step = step.name(), "Running step");
            step.run()?;
        }
        tracing::info!(steps = self.steps.len(), "Pipeline complete");
        Ok(())
    }

    /// Run the pipeline on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the first step error, or `StepError::Join` if the task panicked.
    pub async fn run_blocking(self: Arc<Self>) -> Result<(), StepError> {
        tokio::task::spawn_blocking(move || self.run()).await?
    }
}
