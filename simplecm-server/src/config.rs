//! Server configuration: command line flags plus an optional TOML preset.
//!
//! A preset file names the manager, protocol and self contact and seeds the
//! contact list once a connection exists. Flags given on the command line
//! win over the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7070";
pub const DEFAULT_MANAGER_NAME: &str = "simplecm";
pub const DEFAULT_PROTOCOL_NAME: &str = "simple";
pub const DEFAULT_SELF_ID: &str = "me";

#[derive(Debug, Clone, Parser)]
#[command(name = "simplecm-server", about = "Control server for a toy Telepathy connection manager")]
pub struct ServerConfig {
    /// Address for the control listener.
    #[arg(long, env = "SIMPLECM_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,

    /// Connection manager name.
    #[arg(long)]
    pub manager_name: Option<String>,

    /// Protocol name.
    #[arg(long)]
    pub protocol_name: Option<String>,

    /// Identifier of the self contact.
    #[arg(long)]
    pub self_id: Option<String>,

    /// Create and connect the connection at startup.
    #[arg(long)]
    pub auto_connect: bool,

    /// TOML preset file.
    #[arg(long, env = "SIMPLECM_PRESET")]
    pub preset: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            manager_name: None,
            protocol_name: None,
            self_id: None,
            auto_connect: false,
            preset: None,
        }
    }
}

/// Contents of a preset file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub manager: Option<String>,
    pub protocol: Option<String>,
    pub self_id: Option<String>,
    pub auto_connect: Option<bool>,
    /// Identifiers put on the contact list when a connection is created.
    pub contacts: Vec<String>,
    /// Identifier to status name (`available`, `offline`, `unknown`).
    pub presences: BTreeMap<String, String>,
}

impl Preset {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preset {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Bad preset file {}", path.display()))
    }
}

/// Contacts and presences applied to every new connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seed {
    pub contacts: Vec<String>,
    pub presences: BTreeMap<String, String>,
}

/// Final settings after merging flags, preset and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub manager_name: String,
    pub protocol_name: String,
    pub self_id: String,
    pub auto_connect: bool,
    pub seed: Seed,
}

impl ServerConfig {
    /// Load the preset (if any) and merge it under the command line flags.
    pub fn settings(&self) -> Result<Settings> {
        let preset = match &self.preset {
            Some(path) => {
                tracing::info!("Loading preset from {}", path.display());
                Preset::load(path)?
            }
            None => Preset::default(),
        };
        Ok(self.merge(preset))
    }

    fn merge(&self, preset: Preset) -> Settings {
        Settings {
            manager_name: pick(&self.manager_name, preset.manager, DEFAULT_MANAGER_NAME),
            protocol_name: pick(&self.protocol_name, preset.protocol, DEFAULT_PROTOCOL_NAME),
            self_id: pick(&self.self_id, preset.self_id, DEFAULT_SELF_ID),
            auto_connect: self.auto_connect || preset.auto_connect.unwrap_or(false),
            seed: Seed {
                contacts: preset.contacts,
                presences: preset.presences,
            },
        }
    }
}

fn pick(flag: &Option<String>, file: Option<String>, default: &str) -> String {
    flag.clone()
        .or(file)
        .unwrap_or_else(|| default.to_string())
}
