//! `crxd listen` command implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use crxd_client::Listener;
use crxd_config::{CliSettings, Config};
use crxd_protocol::{connect_host, ws_url};

use crate::error::CliError;
use crate::host::CommandHost;
use crate::output::Output;

/// Arguments for the listen command.
#[derive(Args)]
pub(crate) struct ListenArgs {
    /// Path to configuration file (default: auto-discover crxd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Channel port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Extension name used in the channel path (overrides config).
    #[arg(short, long)]
    name: Option<String>,

    /// Shell command run on each reload, with CRXD_ACTION set to
    /// `background` or `view`.
    #[arg(long, env = "CRXD_ON_RELOAD")]
    on_reload: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ListenArgs {
    /// Execute the listen command. Returns when the channel closes.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the channel is unreachable.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            name: self.name,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let url = ws_url(
            connect_host(&config.server.host),
            config.server.port,
            &config.extension_resolved.name,
        );
        output.highlight(&format!("Listening on {url}"));

        let mut listener = Listener::new(
            url,
            Duration::from_millis(config.client.ping_interval_ms),
            CommandHost::new(self.on_reload),
        );
        listener.run().await?;

        let reloads = listener.host().reloads();
        output.info(&format!("Channel closed after {reloads} reload(s)"));
        Ok(())
    }
}
