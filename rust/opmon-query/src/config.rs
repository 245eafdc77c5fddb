use crate::model::EditorMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

/// Path of the OPVIEW connector on an OpMon instance.
pub const DEFAULT_DATASOURCE_PATH: &str = "/opmon/seagull/www/index.php/wsconnector/action/datasource?mod=OPVIEW&shareduid=W1ksbu9/9O95NGvyrgbVYe6yEE2LcgQdivS5PHhiVe0=&q=";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub opmon_url: String,
    pub datasource_path: String,
    pub datasource_name: String,
    pub api_key: Option<String>,
    pub basic_auth: Option<String>,
    pub request_timeout: Duration,
    pub default_editor_mode: EditorMode,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    opmon_listen_addr: Option<String>,
    #[serde(default)]
    opmon_listen_host: Option<String>,
    #[serde(default)]
    opmon_listen_port: Option<u16>,
    #[serde(default)]
    opmon_url: Option<String>,
    #[serde(default = "default_datasource_path")]
    opmon_datasource_path: String,
    #[serde(default = "default_datasource_name")]
    opmon_datasource_name: String,
    #[serde(default)]
    opmon_api_key: Option<String>,
    #[serde(default)]
    opmon_basic_auth: Option<String>,
    #[serde(default = "default_timeout_secs")]
    opmon_request_timeout_secs: u64,
    #[serde(default)]
    opmon_default_editor_mode: Option<String>,
}

fn default_datasource_path() -> String {
    DEFAULT_DATASOURCE_PATH.to_string()
}

fn default_datasource_name() -> String {
    "opmon".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse OPMON_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.opmon_listen_addr,
            raw.opmon_listen_host,
            raw.opmon_listen_port,
        )?;

        let opmon_url = raw
            .opmon_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .context("OPMON_URL must be set")?;

        let default_editor_mode = match raw.opmon_default_editor_mode.as_deref() {
            None => EditorMode::default(),
            Some(mode) => parse_editor_mode(mode)?,
        };

        Ok(Self {
            listen_addr,
            opmon_url,
            datasource_path: raw.opmon_datasource_path,
            datasource_name: raw.opmon_datasource_name,
            api_key: raw.opmon_api_key.filter(|key| !key.is_empty()),
            basic_auth: raw.opmon_basic_auth.filter(|auth| !auth.is_empty()),
            request_timeout: Duration::from_secs(raw.opmon_request_timeout_secs.max(1)),
            default_editor_mode,
        })
    }

    /// Configuration for an in-process data source, without reading the environment.
    pub fn embedded(opmon_url: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            opmon_url: opmon_url.into(),
            datasource_path: default_datasource_path(),
            datasource_name: default_datasource_name(),
            api_key: None,
            basic_auth: None,
            request_timeout: Duration::from_secs(default_timeout_secs()),
            default_editor_mode: EditorMode::default(),
        }
    }

    /// Base URL every resource path is appended to.
    pub fn datasource_url(&self) -> String {
        format!(
            "{}{}",
            self.opmon_url.trim_end_matches('/'),
            self.datasource_path
        )
    }
}

fn parse_editor_mode(raw: &str) -> Result<EditorMode> {
    match raw.trim().to_lowercase().as_str() {
        "code" => Ok(EditorMode::Code),
        "builder" => Ok(EditorMode::Builder),
        other => anyhow::bail!("invalid OPMON_DEFAULT_EDITOR_MODE value '{other}'"),
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid OPMON_LISTEN_ADDR value")?
            .next()
            .context("OPMON_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid OPMON listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
