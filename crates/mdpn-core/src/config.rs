//! Configuration module
//!
//! Environment-driven settings for the ingest pipeline, the notification
//! transport and the node submission job. Every `from_env` has a matching
//! `from_lookup` taking a variable lookup function, so tests can build a
//! configuration without touching the process environment.

use std::env;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_MAX_AU_SIZE_BYTES;

const DEFAULT_PLUGIN_ID: &str = "edu.mdpn.plugin.MDPNStagingPlugin";
const DEFAULT_CLAMD_PORT: u16 = 3310;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_NODE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FORMAT_TOOL_ARGS: &str = "-R -a {input} -o {output}";

/// Which malware scanner backend to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScannerBackend {
    /// Run the `clamscan` executable once per package.
    #[default]
    Clamscan,
    /// Stream the file to a running `clamd` daemon.
    Clamd,
}

impl std::str::FromStr for ScannerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clamscan" | "process" => Ok(ScannerBackend::Clamscan),
            "clamd" | "daemon" => Ok(ScannerBackend::Clamd),
            other => Err(anyhow::anyhow!(
                "SCANNER_BACKEND must be 'clamscan' or 'clamd', got '{}'",
                other
            )),
        }
    }
}

/// Paths, registry settings and tool locations for one pipeline run.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub upload_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub titledb_path: PathBuf,
    pub titledb_backup_dir: PathBuf,
    pub staging_base_url: String,
    pub plugin_id: String,
    pub max_au_size_bytes: u64,
    pub scanner_backend: ScannerBackend,
    pub clamscan_path: String,
    pub clamd_host: String,
    pub clamd_port: u16,
    pub format_tool_path: String,
    pub format_tool_args: Vec<String>,
    pub ingest_log_csv: PathBuf,
    pub ingest_log_html: PathBuf,
    pub format_log_csv: PathBuf,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let upload_dir = PathBuf::from(required(&var, "UPLOAD_DIR")?);
        let staging_dir = PathBuf::from(required(&var, "STAGING_DIR")?);
        let titledb_path = PathBuf::from(required(&var, "TITLEDB_PATH")?);
        let staging_base_url = required(&var, "STAGING_BASE_URL")?;

        let titledb_backup_dir = var("TITLEDB_BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                titledb_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        let log_dir = staging_dir
            .parent()
            .unwrap_or(&staging_dir)
            .join("logs");

        let scanner_backend = match var("SCANNER_BACKEND") {
            Some(v) => v.parse()?,
            None => ScannerBackend::default(),
        };

        let config = Self {
            upload_dir,
            titledb_path,
            titledb_backup_dir,
            staging_base_url,
            plugin_id: var("LOCKSS_PLUGIN_ID").unwrap_or_else(|| DEFAULT_PLUGIN_ID.to_string()),
            max_au_size_bytes: var("MAX_AU_SIZE_BYTES")
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("MAX_AU_SIZE_BYTES must be a valid number"))
                })
                .transpose()?
                .unwrap_or(DEFAULT_MAX_AU_SIZE_BYTES),
            scanner_backend,
            clamscan_path: var("CLAMSCAN_PATH").unwrap_or_else(|| "clamscan".to_string()),
            clamd_host: var("CLAMD_HOST").unwrap_or_else(|| "localhost".to_string()),
            clamd_port: var("CLAMD_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CLAMD_PORT),
            format_tool_path: var("FORMAT_TOOL_PATH").unwrap_or_else(|| "droid".to_string()),
            format_tool_args: var("FORMAT_TOOL_ARGS")
                .unwrap_or_else(|| DEFAULT_FORMAT_TOOL_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            ingest_log_csv: var("INGEST_LOG_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| log_dir.join("ingest_log.csv")),
            ingest_log_html: var("INGEST_LOG_HTML")
                .map(PathBuf::from)
                .unwrap_or_else(|| log_dir.join("ingest_log.html")),
            format_log_csv: var("FORMAT_LOG_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| log_dir.join("droid_log.csv")),
            staging_dir,
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_au_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_AU_SIZE_BYTES must be greater than 0"));
        }

        if !is_http_url(&self.staging_base_url) {
            return Err(anyhow::anyhow!(
                "STAGING_BASE_URL must be an http:// or https:// URL"
            ));
        }

        if self.plugin_id.trim().is_empty() {
            return Err(anyhow::anyhow!("LOCKSS_PLUGIN_ID must not be empty"));
        }

        if self.upload_dir == self.staging_dir {
            return Err(anyhow::anyhow!(
                "UPLOAD_DIR and STAGING_DIR must be different directories"
            ));
        }

        Ok(())
    }
}

/// SMTP transport and debug-sink settings for notifications.
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: bool,
    pub cc: Vec<String>,
    /// Write rendered messages to `debug_dir` instead of sending them.
    pub debug: bool,
    pub debug_dir: PathBuf,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: None,
            smtp_password: None,
            smtp_from: None,
            smtp_tls: true,
            cc: Vec::new(),
            debug: false,
            debug_dir: PathBuf::from("./email_debug"),
        }
    }
}

impl EmailConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            enabled: flag(&var, "EMAIL_ENABLED", false),
            smtp_host: var("SMTP_HOST"),
            smtp_port: var("SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .filter(|&p| p > 0)
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_user: var("SMTP_USER"),
            smtp_password: var("SMTP_PASSWORD"),
            smtp_from: var("SMTP_FROM"),
            smtp_tls: flag(&var, "SMTP_TLS", true),
            cc: var("EMAIL_CC").map(|s| split_list(&s)).unwrap_or_default(),
            debug: flag(&var, "EMAIL_DEBUG", false),
            debug_dir: var("EMAIL_DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./email_debug")),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.enabled && !self.debug && (self.smtp_host.is_none() || self.smtp_from.is_none()) {
            return Err(anyhow::anyhow!(
                "EMAIL_ENABLED=true requires SMTP_HOST and SMTP_FROM to be set"
            ));
        }
        Ok(())
    }
}

/// Settings for pushing AUIDs to preservation nodes.
#[derive(Clone, Debug)]
pub struct SubmissionConfig {
    /// http(s) URL or local path of the registry file.
    pub titledb_url: String,
    pub servers: Vec<String>,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl SubmissionConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            titledb_url: required(&var, "TITLEDB_URL")?,
            servers: split_list(&required(&var, "LOCKSS_SERVERS")?),
            username: required(&var, "LOCKSS_USERNAME")?,
            password: required(&var, "LOCKSS_PASSWORD")?,
            timeout_secs: var("LOCKSS_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&t| t > 0)
                .unwrap_or(DEFAULT_NODE_TIMEOUT_SECS),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.servers.is_empty() {
            return Err(anyhow::anyhow!("LOCKSS_SERVERS must list at least one node"));
        }
        if let Some(bad) = self.servers.iter().find(|s| !is_http_url(s)) {
            return Err(anyhow::anyhow!(
                "LOCKSS_SERVERS entry '{}' must be an http:// or https:// URL",
                bad
            ));
        }
        Ok(())
    }

    pub fn titledb_is_remote(&self) -> bool {
        is_http_url(&self.titledb_url)
    }
}

/// Configuration for one preprocessing run.
#[derive(Clone, Debug)]
pub struct Config {
    pub ingest: IngestConfig,
    pub email: EmailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            ingest: IngestConfig::from_lookup(&lookup)?,
            email: EmailConfig::from_lookup(&lookup)?,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.ingest.validate()?;
        self.email.validate()
    }
}

fn required<F>(var: &F, key: &str) -> Result<String, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    var(key).ok_or_else(|| anyhow::anyhow!("{} must be set", key))
}

fn flag<F>(var: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| v.trim().to_lowercase())
        .and_then(|v| match v.as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
