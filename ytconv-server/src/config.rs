//! Server configuration, assembled once at startup and passed down explicitly.

use clap::ValueEnum;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use ytconv::ConvertOptions;

/// Deployment environment; decides the default port
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    /// Local development behind the front-end dev server proxy
    Development,
    /// Deployed build serving the bundled front end
    Production,
}

impl Environment {
    pub fn default_port(self) -> u16 {
        match self {
            Environment::Development => 3001,
            Environment::Production => 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub environment: Environment,
    /// Directory holding the built single-page application
    pub static_dir: PathBuf,
    pub convert: ConvertOptions,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
