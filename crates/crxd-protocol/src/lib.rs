//! Wire protocol for the crxd update channel.
//!
//! Both halves of the channel agree on three things:
//!
//! - the upgrade path, `/<url-encoded extension name>/crx`
//! - the client's liveness ping, `{"type":"ping"}`
//! - the server's update signal, the bare text [`UPDATE_CONTENT`]
//!
//! The [`RELOAD`] value never crosses the socket. It is what the content
//! bridge sends to the background bridge inside the extension.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Server → client signal: extension assets changed.
pub const UPDATE_CONTENT: &str = "UPDATE_CONTENT";

/// Content bridge → background bridge request to restart the extension.
pub const RELOAD: &str = "RELOAD";

/// Default extension identifier used in the upgrade path.
pub const DEFAULT_EXTENSION_NAME: &str = "web-update-alerts";

/// Characters left unescaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Message sent from the client to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keeps the transport from idling out. Carries no state.
    Ping,
}

impl ClientMessage {
    /// Encode as a JSON text frame.
    #[must_use]
    pub fn to_json(self) -> String {
        // Unit variants with an internal tag always serialize.
        serde_json::to_string(&self).unwrap_or_else(|_| r#"{"type":"ping"}"#.to_owned())
    }

    /// Decode a text frame. Returns `None` for anything malformed.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Percent-encode an extension name the way `encodeURIComponent` does.
#[must_use]
pub fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, COMPONENT).to_string()
}

/// Upgrade path the channel accepts connections on.
#[must_use]
pub fn upgrade_path(name: &str) -> String {
    format!("/{}/crx", encode_name(name))
}

/// Host a client should dial to reach a channel bound on `bind_host`.
///
/// Wildcard binds are reached through `localhost`.
#[must_use]
pub fn connect_host(bind_host: &str) -> &str {
    match bind_host {
        "0.0.0.0" | "::" | "[::]" => "localhost",
        host => host,
    }
}

/// Full WebSocket URL for a channel.
#[must_use]
pub fn ws_url(host: &str, port: u16, name: &str) -> String {
    format!("ws://{host}:{port}{}", upgrade_path(name))
}
