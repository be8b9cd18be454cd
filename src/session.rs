//! Server-reported settings discovered on the first successful connection
//! and cached by the pool for the fast "resolved" reconnect path.

use std::net::SocketAddr;

/// Settings exposed by the server on connect, cached by the pool after the
/// first full handshake so subsequent connections can skip DNS/negotiation.
#[derive(Clone, Debug, Default)]
pub struct SessionSettings {
    /// The server's recommendation for how many connections a single client
    /// should maintain. `None` if the server did not report one.
    pub suggested_pool_concurrency: Option<u32>,
}

impl SessionSettings {
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "suggested_pool_concurrency" => {
                self.suggested_pool_concurrency.map(|v| v.to_string())
            }
            _ => None,
        }
    }
}

/// The resolved server address plus cached settings, stashed by the pool
/// after its first successful connect so later connects can short-circuit
/// the full handshake (`Pool::_get_new_connection`, step 2).
#[derive(Clone, Debug)]
pub struct ResolvedServer {
    pub address: SocketAddr,
    pub settings: SessionSettings,
}
