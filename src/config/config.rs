//! Configuration structures and loading

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Local stream socket the HTTP server listens on
    #[serde(default)]
    pub socket: SocketConfiguration,

    /// Daemon-home directories and other on-disk layout
    #[serde(default)]
    pub system: SystemConfiguration,

    /// Default networking/IPAM policy
    #[serde(default)]
    pub network: NetworkConfiguration,

    /// Healthcheck defaults applied when a probe omits a field
    #[serde(default)]
    pub health: HealthConfiguration,
}

impl Configuration {
    /// Load configuration from a TOML file, resolving relative paths against
    /// the config file's own directory and creating the daemon-home tree.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = std::path::Path::new(path);
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Configuration =
            toml::from_str(&content).with_context(|| "Failed to parse configuration")?;

        let base_dir = config_path
            .parent()
            .and_then(|p| if p.as_os_str().is_empty() { None } else { Some(p) })
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        config.system.resolve_paths(&base_dir);
        if !config.socket.path.is_absolute() {
            config.socket.path = base_dir.join(&config.socket.path);
        }

        std::fs::create_dir_all(&config.system.data_directory)?;
        std::fs::create_dir_all(&config.system.volumes_directory)?;
        std::fs::create_dir_all(&config.system.log_directory)?;
        if let Some(parent) = config.socket.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(config)
    }

    /// Load with defaults only, creating the daemon-home tree under the
    /// given directory. Used by tests and by `vessel-daemon diagnose`.
    pub fn load_defaults(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let mut config = Configuration {
            debug: false,
            socket: SocketConfiguration {
                path: home.join("vessel.sock"),
                group_access: true,
            },
            system: SystemConfiguration::default_under(&home),
            network: NetworkConfiguration::default(),
            health: HealthConfiguration::default(),
        };
        config.system.resolve_paths(&home);
        std::fs::create_dir_all(&config.system.data_directory)?;
        std::fs::create_dir_all(&config.system.volumes_directory)?;
        std::fs::create_dir_all(&config.system.log_directory)?;
        if let Some(parent) = config.socket.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config)
    }
}

/// Local stream socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfiguration {
    /// Path to the Unix domain socket
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,

    /// Whether the socket is created group-accessible (mode 0660) rather
    /// than owner-only
    #[serde(default = "default_true")]
    pub group_access: bool,
}

impl Default for SocketConfiguration {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            group_access: true,
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(".vessel/vessel.sock")
}

fn default_true() -> bool {
    true
}

/// Daemon-home directory layout
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfiguration {
    /// Root of the daemon's persisted state (`state.db`, `images/`, ...)
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Directory holding named/anonymous volume mountpoints
    #[serde(default = "default_volumes_directory")]
    pub volumes_directory: PathBuf,

    /// Directory holding per-container stdout/stderr log files
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Maximum request body size the HTTP codec will buffer, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            volumes_directory: default_volumes_directory(),
            log_directory: default_log_directory(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl SystemConfiguration {
    fn default_under(home: &std::path::Path) -> Self {
        Self {
            data_directory: home.join("data"),
            volumes_directory: home.join("volumes"),
            log_directory: home.join("logs"),
            max_body_bytes: default_max_body_bytes(),
        }
    }

    /// Resolve all relative paths against `base_dir`, leaving absolute paths
    /// untouched.
    pub fn resolve_paths(&mut self, base_dir: &std::path::Path) {
        self.data_directory = Self::resolve_path(&self.data_directory, base_dir);
        self.volumes_directory = Self::resolve_path(&self.volumes_directory, base_dir);
        self.log_directory = Self::resolve_path(&self.log_directory, base_dir);
    }

    fn resolve_path(path: &std::path::Path, base_dir: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Path to the SQLite state database.
    pub fn state_db_path(&self) -> PathBuf {
        self.data_directory.join("state.db")
    }
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(".vessel/data")
}

fn default_volumes_directory() -> PathBuf {
    PathBuf::from(".vessel/volumes")
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".vessel/logs")
}

fn default_max_body_bytes() -> usize {
    // 5 minute parsing ceiling is enforced as a request timeout, not a byte
    // cap; this bounds memory for non-streaming JSON bodies.
    64 * 1024 * 1024
}

/// Default networking/IPAM policy
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfiguration {
    /// Base /12 range user-network subnets are auto-allocated from, in
    /// sequential /16 steps (spec.md §4.4)
    #[serde(default = "default_allocator_base")]
    pub allocator_base: String,

    /// Subnet reserved for the default `bridge` network
    #[serde(default = "default_bridge_subnet")]
    pub bridge_subnet: String,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            allocator_base: default_allocator_base(),
            bridge_subnet: default_bridge_subnet(),
        }
    }
}

fn default_allocator_base() -> String {
    "172.16.0.0/12".into()
}

fn default_bridge_subnet() -> String {
    "172.17.0.0/16".into()
}

/// Healthcheck defaults applied when a container's probe descriptor omits a
/// field.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfiguration {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub start_period_secs: u64,
}

impl Default for HealthConfiguration {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            start_period_secs: 0,
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}
