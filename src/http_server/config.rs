//! Listener settings for the query server

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Interface or hostname to listen on
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; any origin when empty
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Serve `/metrics`; `/health` is always served
    #[serde(default = "default_expose_metrics")]
    pub expose_metrics: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_expose_metrics() -> bool {
    true
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            expose_metrics: default_expose_metrics(),
        }
    }
}

impl HttpServerConfig {
    /// Resolve `host:port`, taking the first address a hostname maps to
    pub fn bind_addr(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' resolves to no address", self.host),
                )
            })
    }
}
