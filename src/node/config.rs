// src/node/config.rs

use serde::Deserialize;
use std::fs;
use tracing::info;

const CONFIG_PATH: &str = "config/network.toml";

// Node configuration, loaded from `config/network.toml`. The gossip
// port is not configured directly: it always sits GOSSIP_PORT_OFFSET
// above the HTTP port, so seed lists agree across deployments.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3001
}

fn default_db_path() -> String {
    "./database".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            db_path: default_db_path(),
            bootstrap_nodes: Vec::new(),
        }
    }
}

impl Config {
    // Loads the configuration file, falling back to defaults when it
    // does not exist.
    pub fn load() -> Self {
        match fs::read_to_string(CONFIG_PATH) {
            Ok(contents) => toml::from_str(&contents).expect("could not parse network.toml"),
            Err(_) => {
                info!(path = CONFIG_PATH, "no config file found, using defaults");
                Self::default()
            }
        }
    }

    // The node's public identity, e.g. http://127.0.0.1:3001.
    pub fn node_url(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }
}
