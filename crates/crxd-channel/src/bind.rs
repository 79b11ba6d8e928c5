//! Listener binding with upward port fallback.

use std::io;

use tokio::net::TcpListener;

use crate::ChannelError;

/// Bind `host:preferred`, walking up one port at a time while the address is in use.
///
/// Any error other than address-in-use is returned as-is. Returns the
/// listener together with the port it actually bound.
pub(crate) async fn bind_with_fallback(
    host: &str,
    preferred: u16,
) -> Result<(TcpListener, u16), ChannelError> {
    let mut port = preferred;

    loop {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let bound = listener.local_addr().map_or(port, |addr| addr.port());
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::warn!(port, "Port already in use, trying next port");
                port = port
                    .checked_add(1)
                    .ok_or(ChannelError::PortExhausted { preferred })?;
            }
            Err(source) => {
                return Err(ChannelError::Bind {
                    host: host.to_owned(),
                    port,
                    source,
                });
            }
        }
    }
}
