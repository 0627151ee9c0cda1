use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::DEFAULT_CHANNEL_CAPACITY;

pub const DEFAULT_MEMBER_PORT: u16 = 6701;
pub const DEFAULT_GROUP_NAME: &str = "dev";
pub const DEFAULT_GROUP_PASSWORD: &str = "dev-pass";

/// Embedded cluster member, hosting the shared lists
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 binds an ephemeral port
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_group_password")]
    pub group_password: String,
}

impl MemberConfig {
    pub fn new(host: &str, port: u16) -> Self {
        MemberConfig {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for MemberConfig {
    fn default() -> Self {
        MemberConfig {
            host: default_host(),
            port: default_port(),
            group_name: default_group_name(),
            group_password: default_group_password(),
        }
    }
}

/// Client side addressing of a member hosted in another process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// member addresses `host:port`, tried in order
    pub addresses: Vec<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// upper bound of a single request round trip
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// interval between reconnect attempts of a subscription
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl ClientConfig {
    pub fn new<T: ToString>(address: T) -> Self {
        ClientConfig {
            addresses: vec![address.to_string()],
            group_name: default_group_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }

    pub fn with_group_name(mut self, group_name: &str) -> Self {
        self.group_name = group_name.to_string();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            num_workers: default_num_workers(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"], ignore ascii case
    #[serde(default = "default_log_level")]
    pub level: String,
    /// log to stdout, otherwise to a rolling file
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default)]
    pub file_path: Option<String>,
    /// a log4rs yaml file, overrides every other field
    #[serde(default)]
    pub config_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            console: true,
            file_path: None,
            config_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub member: MemberConfig,
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl ClusterConfig {
    pub fn new_local() -> Self {
        ClusterConfig {
            member: MemberConfig::default(),
            client: None,
            worker: WorkerConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// the configured client, or a client of the local member
    pub fn client_config(&self) -> ClientConfig {
        match &self.client {
            Some(client) => client.clone(),
            None => ClientConfig::new(format!("localhost:{}", self.member.port))
                .with_group_name(self.member.group_name.as_str()),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig::new_local()
    }
}

/// load yaml config form path
pub fn load_config(path: PathBuf) -> anyhow::Result<ClusterConfig> {
    let context =
        read_config_from_path(path).map_err(|e| anyhow!("read Cluster config error {}", e))?;
    parse_config(context.as_str())
}

pub fn parse_config(context: &str) -> anyhow::Result<ClusterConfig> {
    serde_yaml::from_str(context).map_err(|e| anyhow!("parse Cluster config error {}", e))
}

/// load text config form path
pub fn read_config_from_path(path: PathBuf) -> Result<String, std::io::Error> {
    let mut file = File::open(path)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MEMBER_PORT
}

fn default_group_name() -> String {
    DEFAULT_GROUP_NAME.to_string()
}

fn default_group_password() -> String {
    DEFAULT_GROUP_PASSWORD.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_retry_interval_ms() -> u64 {
    3000
}

fn default_num_workers() -> usize {
    num_cpus::get()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_true() -> bool {
    true
}
