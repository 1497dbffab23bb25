//! keyflow.kdl loading
//!
//! ```kdl
//! provider "fusionauth" {
//!     host "https://auth.example.com"
//!     api-key-env "FUSIONAUTH_API_KEY"
//!     tenant-id "..."
//!     timeout 60
//!     interval 3
//!     parallelism 4
//! }
//! length-updates {
//!     RS256 "in-place"
//! }
//! key "access-token" {
//!     key-id "6f1c..."
//!     name "Access token signing key"
//!     algorithm "RS256"
//!     length 2048
//! }
//! ```

use kdl::{KdlDocument, KdlNode};
use keyflow_cloud::DEFAULT_PARALLELISM;
use keyflow_fusionauth::api::API_KEY_ENV;
use keyflow_fusionauth::{Algorithm, FusionAuthError, LengthPolicy, LengthUpdate, SigningKey};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILES: [&str; 2] = ["keyflow.kdl", ".keyflow.kdl"];
const CONFIG_DIR: &str = ".keyflow";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found. Looked for:\n\
        - current directory: keyflow.kdl, .keyflow.kdl\n\
        - ./.keyflow/ directory\n\
        - ~/.config/keyflow/keyflow.kdl\n\
        Set KEYFLOW_CONFIG or pass --config to point at a file directly"
    )]
    NotFound,

    #[error("Configuration file does not exist: {0}")]
    Missing(PathBuf),

    #[error("KDL parse error: {0}")]
    Kdl(#[from] kdl::KdlError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid key {name:?}: {source}")]
    Key {
        name: String,
        #[source]
        source: FusionAuthError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The `provider "fusionauth"` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Falls back to FUSIONAUTH_HOST when unset
    pub host: Option<String>,
    /// Name of the env var holding the API key
    pub api_key_env: String,
    pub tenant_id: Option<String>,
    pub timeout: Option<Duration>,
    pub interval: Option<Duration>,
    pub parallelism: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_key_env: API_KEY_ENV.to_string(),
            tenant_id: None,
            timeout: None,
            interval: None,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyflowConfig {
    pub provider: ProviderConfig,
    pub length_updates: LengthPolicy,
    /// Declared keys by instance name
    pub keys: BTreeMap<String, SigningKey>,
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|e| e.value().as_integer())
}

fn require_string(node: &KdlNode, context: &str) -> Result<String> {
    first_string(node).map(|s| s.to_string()).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "{} {} requires a string value",
            context,
            node.name().value()
        ))
    })
}

fn require_positive(node: &KdlNode, context: &str) -> Result<u64> {
    first_integer(node)
        .filter(|n| *n > 0)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "{} {} requires a positive integer",
                context,
                node.name().value()
            ))
        })
}

/// Parse a keyflow.kdl document
pub fn parse_config(content: &str) -> Result<KeyflowConfig> {
    let doc: KdlDocument = content.parse()?;
    let mut config = KeyflowConfig::default();
    let mut seen_provider = false;

    for node in doc.nodes() {
        match node.name().value() {
            "provider" => {
                if seen_provider {
                    return Err(ConfigError::Invalid(
                        "only one provider block is allowed".to_string(),
                    ));
                }
                config.provider = parse_provider(node)?;
                seen_provider = true;
            }
            "length-updates" => parse_length_updates(node, &mut config.length_updates)?,
            "key" => {
                let (name, key) = parse_key(node)?;
                if config.keys.contains_key(&name) {
                    return Err(ConfigError::Invalid(format!("key {:?} is declared twice", name)));
                }
                config.keys.insert(name, key);
            }
            other => {
                return Err(ConfigError::Invalid(format!("unknown node: {}", other)));
            }
        }
    }

    Ok(config)
}

fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let kind = first_string(node)
        .ok_or_else(|| ConfigError::Invalid("provider requires a name".to_string()))?;
    if kind != "fusionauth" {
        return Err(ConfigError::Invalid(format!(
            "unsupported provider {:?} (only \"fusionauth\" is available)",
            kind
        )));
    }

    let mut provider = ProviderConfig::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "host" => provider.host = Some(require_string(child, "provider")?),
                "api-key-env" => provider.api_key_env = require_string(child, "provider")?,
                "tenant-id" => provider.tenant_id = Some(require_string(child, "provider")?),
                "timeout" => {
                    provider.timeout =
                        Some(Duration::from_secs(require_positive(child, "provider")?));
                }
                "interval" => {
                    provider.interval =
                        Some(Duration::from_secs(require_positive(child, "provider")?));
                }
                "parallelism" => {
                    provider.parallelism = require_positive(child, "provider")? as usize;
                }
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown provider setting: {}",
                        other
                    )));
                }
            }
        }
    }
    Ok(provider)
}

fn parse_length_updates(node: &KdlNode, policy: &mut LengthPolicy) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        let algorithm: Algorithm = child
            .name()
            .value()
            .parse()
            .map_err(|e: FusionAuthError| ConfigError::Invalid(e.to_string()))?;
        let update: LengthUpdate = require_string(child, "length-updates")?
            .parse()
            .map_err(|e: FusionAuthError| ConfigError::Invalid(e.to_string()))?;
        policy
            .set(algorithm, update)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }
    Ok(())
}

fn parse_key(node: &KdlNode) -> Result<(String, SigningKey)> {
    let name = first_string(node)
        .ok_or_else(|| ConfigError::Invalid("key requires an instance label".to_string()))?
        .to_string();
    let key_error = |source| ConfigError::Key {
        name: name.clone(),
        source,
    };

    let mut key_id = None;
    let mut display_name = None;
    let mut algorithm = None;
    let mut length = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "key-id" => key_id = Some(require_string(child, "key")?),
                "name" => display_name = Some(require_string(child, "key")?),
                "algorithm" => {
                    let value = require_string(child, "key")?;
                    algorithm = Some(value.parse::<Algorithm>().map_err(key_error)?);
                }
                "length" => {
                    let bits = require_positive(child, "key")?;
                    length = Some(u32::try_from(bits).map_err(|_| {
                        ConfigError::Invalid(format!("key {:?}: length {} is too large", name, bits))
                    })?);
                }
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown key setting: {}",
                        other
                    )));
                }
            }
        }
    }

    let algorithm = algorithm
        .ok_or_else(|| ConfigError::Invalid(format!("key {:?} requires an algorithm", name)))?;
    let display_name = display_name
        .ok_or_else(|| ConfigError::Invalid(format!("key {:?} requires a name", name)))?;

    let key = SigningKey {
        key_id,
        name: display_name,
        algorithm,
        length,
    };
    Ok((name, key))
}

/// Read and parse a configuration file
pub fn load_config(path: &Path) -> Result<KeyflowConfig> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), keys = config.keys.len(), "Loaded configuration");
    Ok(config)
}

/// Find a configuration file starting from `dir`
///
/// Search order:
/// 1. `dir`: keyflow.kdl, .keyflow.kdl
/// 2. `dir/.keyflow/`: same order
/// 3. ~/.config/keyflow/keyflow.kdl
pub fn find_config_in(dir: &Path) -> Result<PathBuf> {
    for filename in &CONFIG_FILES {
        let path = dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let config_dir = dir.join(CONFIG_DIR);
    if config_dir.is_dir() {
        for filename in &CONFIG_FILES {
            let path = config_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(global_dir) = dirs::config_dir() {
        let global_config = global_dir.join("keyflow").join(CONFIG_FILES[0]);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::NotFound)
}

/// Directory that owns the `.keyflow/` state for a configuration file
pub fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|name| name == CONFIG_DIR) {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}
