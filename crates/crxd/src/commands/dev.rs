//! `crxd dev` command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use crxd_channel::{ChannelConfig, start_channel};
use crxd_config::{CliSettings, Config, ExtensionConfig};
use crxd_manifest::{BridgeSettings, write_constants};
use crxd_pipeline::{
    BridgeStep, BuildProcess, CommandStep, ManifestStep, Pipeline, Readiness, Step,
};
use crxd_protocol::ws_url;
use crxd_watch::{ChangeWatcher, PathFilter, run_debounced};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the dev command.
#[derive(Args)]
pub(crate) struct DevArgs {
    /// Path to configuration file (default: auto-discover crxd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind the update channel to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Preferred update channel port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Extension name used in the channel path (overrides config).
    #[arg(short, long)]
    name: Option<String>,

    /// Quiet window before a rebuild, in milliseconds (overrides config).
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl DevArgs {
    /// Execute the dev command.
    ///
    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if any startup stage fails: configuration, binding,
    /// the initial build or the first pipeline run.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            name: self.name,
            dist_dir: None,
            debounce_ms: self.debounce_ms,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let extension = &config.extension_resolved;

        let channel = start_channel(&ChannelConfig {
            host: config.server.host.clone(),
            port: config.server.port,
            extension_name: extension.name.clone(),
        })
        .await?;
        let port = channel.port();
        if port != config.server.port {
            output.warning(&format!(
                "Port {} is in use, using {port}",
                config.server.port
            ));
        }
        output.highlight(&format!(
            "Update channel: {}",
            ws_url(&config.server.host, port, &extension.name)
        ));

        write_constants(&extension.constants_file, port, &extension.name)?;

        let build = if config.build.command.is_empty() {
            output.info("Build process: disabled");
            None
        } else {
            let readiness = Readiness::new(
                config.build.ready_marker.clone(),
                Duration::from_millis(config.build.settle_ms),
            );
            output.info(&format!("Build: {}", config.build.command.join(" ")));
            let mut build =
                BuildProcess::spawn(&config.build.command, &extension.project_dir, readiness)?;
            build.wait_ready().await?;
            Some(build)
        };

        let pipeline = Arc::new(build_pipeline(&config, port));
        Arc::clone(&pipeline).run_blocking().await?;
        output.success(&format!(
            "Dev build ready in {}",
            extension.dist_dir.display()
        ));

        let filter = PathFilter::new(
            &config.watch.include_patterns(),
            &config.watch.exclude,
            &output_dir_name(extension),
        )?;
        let mut watcher = ChangeWatcher::new(extension.project_dir.clone(), filter);
        let events = watcher.start()?;

        let notifier = channel.notifier();
        let window = Duration::from_millis(config.watch.debounce_ms);
        let cycles = run_debounced(events, window, move || {
            let pipeline = Arc::clone(&pipeline);
            let notifier = notifier.clone();
            async move {
                match pipeline.run_blocking().await {
                    Ok(()) => {
                        notifier.notify_update();
                        tracing::info!("Rebuild complete");
                    }
                    Err(e) => tracing::error!(error = %e, "Rebuild failed, skipping update"),
                }
            }
        });

        output.info("Watching for changes (Ctrl+C to stop)");
        tokio::select! {
            () = cycles => tracing::warn!("Change watcher stopped"),
            result = shutdown_signal() => result?,
        }

        output.info("Shutting down...");
        if let Some(build) = build {
            build.kill().await?;
        }
        drop(watcher);
        channel.shutdown().await?;

        Ok(())
    }
}

/// Steps run after every debounced change.
fn build_pipeline(config: &Config, port: u16) -> Pipeline {
    let extension = &config.extension_resolved;

    let scripts: Box<dyn Step> = match &config.build.scripts_command {
        Some(argv) => Box::new(
            CommandStep::new("scripts", argv.clone(), extension.project_dir.clone())
                .requires(extension.constants_file.clone()),
        ),
        None => Box::new(BridgeStep::new(
            extension.dist_dir.clone(),
            BridgeSettings {
                host: config.server.host.clone(),
                port,
                extension_name: extension.name.clone(),
                ping_interval_ms: config.client.ping_interval_ms,
            },
        )),
    };

    Pipeline::new(vec![
        scripts,
        Box::new(ManifestStep::new(extension.dist_dir.clone())),
    ])
}

/// Build output directory relative to the watched root.
fn output_dir_name(extension: &ExtensionConfig) -> String {
    extension
        .dist_dir
        .strip_prefix(&extension.project_dir)
        .unwrap_or(&extension.dist_dir)
        .to_string_lossy()
        .into_owned()
}

/// Wait for Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    Ok(())
}
