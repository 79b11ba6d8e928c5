//! Terminal stand-in for the browser runtime.

use std::process::Stdio;

use async_trait::async_trait;
use crxd_client::{Host, HostError};
use tokio::process::Command;

use crate::output::Output;

/// Reload action passed to the hook command in `CRXD_ACTION`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Background,
    View,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::View => "view",
        }
    }
}

/// Host that reports reloads and optionally runs a shell hook per action.
///
/// The context is always valid. A failing hook for the background action
/// counts as an unacknowledged reload.
pub(crate) struct CommandHost {
    output: Output,
    on_reload: Option<String>,
    reloads: usize,
}

impl CommandHost {
    pub(crate) fn new(on_reload: Option<String>) -> Self {
        Self {
            output: Output::new(),
            on_reload,
            reloads: 0,
        }
    }

    pub(crate) fn reloads(&self) -> usize {
        self.reloads
    }

    /// Run the hook on tokio's process driver, so other tasks keep running.
    async fn run_hook(&self, action: Action) -> Result<(), HostError> {
        let Some(hook) = &self.on_reload else {
            return Ok(());
        };

        let status = shell(hook)
            .env("CRXD_ACTION", action.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| HostError(format!("failed to run '{hook}': {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(HostError(format!("'{hook}' exited with {status}")))
        }
    }
}

#[cfg(unix)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(windows)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    cmd
}

#[async_trait]
impl Host for CommandHost {
    fn is_context_valid(&self) -> bool {
        true
    }

    async fn reload_background(&mut self) -> Result<(), HostError> {
        self.output.info("Update received, reloading extension");
        self.run_hook(Action::Background).await
    }

    async fn reload_view(&mut self) {
        self.reloads += 1;
        if let Err(e) = self.run_hook(Action::View).await {
            self.output.warning(&format!("View reload hook failed: {e}"));
            return;
        }
        self.output.success(&format!("Reloaded ({} so far)", self.reloads));
    }
}
