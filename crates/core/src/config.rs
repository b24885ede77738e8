//! Configuration types shared across crates.
//!
//! The whole configuration is one explicit [`AppConfig`] value built once at
//! startup and handed to each component. Every section deserialises with
//! defaults so a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Optional cap on request body size in bytes. Uploads are unbounded
    /// when unset.
    #[serde(default)]
    pub max_request_bytes: Option<u64>,
    /// Page size used by listings when the client does not ask for one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Largest page a client may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_request_bytes: None,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err("server page sizes must be at least 1".to_string());
        }
        if self.default_page_size > self.max_page_size {
            return Err(format!(
                "server.default_page_size {} exceeds server.max_page_size {}",
                self.default_page_size, self.max_page_size
            ));
        }
        Ok(())
    }

    /// Clamp a client-requested page size into the configured range.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

/// Blob storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the content store.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Spool directory for uploads that are still being received.
    #[serde(default = "default_staging_path")]
    pub staging_path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/resources")
}

fn default_staging_path() -> PathBuf {
    PathBuf::from("./data/staging")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            staging_path: default_staging_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.path == self.staging_path {
            return Err("storage.staging_path must differ from storage.path".to_string());
        }
        // Staged files are named by uuid and would be mistaken for blobs.
        if self.staging_path.starts_with(&self.path) {
            return Err("storage.staging_path must not live inside storage.path".to_string());
        }
        Ok(())
    }
}

/// Metadata store configuration (SQLite).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Database file path.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// Query timeout in seconds (advisory only - SQLite cannot cancel queries).
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: Option<u64>,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/metadata.db")
}

fn default_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

/// Package upload rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// File extensions accepted for upload, lowercase and without the dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_title_min_len")]
    pub title_min_len: usize,
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,
    #[serde(default = "default_description_min_len")]
    pub description_min_len: usize,
    #[serde(default = "default_description_max_len")]
    pub description_max_len: usize,
    /// Extensions that are tagged under an umbrella name instead of their own.
    #[serde(default = "default_extension_tag_aliases")]
    pub extension_tag_aliases: BTreeMap<String, String>,
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["ocs".to_string(), "ocf".to_string(), "ocd".to_string()]
}

fn default_title_min_len() -> usize {
    3
}

fn default_title_max_len() -> usize {
    32
}

fn default_description_min_len() -> usize {
    50
}

fn default_description_max_len() -> usize {
    150
}

/// `ocs`/`ocf` are scenarios, `ocd` are object packs.
pub fn default_extension_tag_aliases() -> BTreeMap<String, String> {
    [("ocs", "scenario"), ("ocf", "scenario"), ("ocd", "objects")]
        .into_iter()
        .map(|(ext, alias)| (ext.to_string(), alias.to_string()))
        .collect()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            title_min_len: default_title_min_len(),
            title_max_len: default_title_max_len(),
            description_min_len: default_description_min_len(),
            description_max_len: default_description_max_len(),
            extension_tag_aliases: default_extension_tag_aliases(),
        }
    }
}

impl PackagesConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.allowed_extensions.is_empty() {
            return Err("packages.allowed_extensions must not be empty".to_string());
        }
        for ext in &self.allowed_extensions {
            if ext.is_empty()
                || ext.starts_with('.')
                || ext.chars().any(|c| !c.is_ascii_alphanumeric() || c.is_ascii_uppercase())
            {
                return Err(format!(
                    "packages.allowed_extensions entry {ext:?} must be lowercase alphanumeric without a dot"
                ));
            }
        }
        if self.title_min_len > self.title_max_len {
            return Err("packages.title_min_len exceeds packages.title_max_len".to_string());
        }
        if self.description_min_len > self.description_max_len {
            return Err(
                "packages.description_min_len exceeds packages.description_max_len".to_string(),
            );
        }
        Ok(())
    }
}

/// Bootstrap moderator account.
///
/// At startup the account is created, or its token hash and name refreshed,
/// so the operator always has one moderator to work with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the bearer token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Display name of the moderator account.
    #[serde(default = "default_admin_name")]
    pub name: String,
}

fn default_admin_name() -> String {
    "admin".to_string()
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            name: default_admin_name(),
        }
    }

    /// The token hash without an optional `sha256:` prefix, lowercased.
    pub fn normalized_token_hash(&self) -> Result<String, String> {
        let hash = self
            .token_hash
            .strip_prefix("sha256:")
            .unwrap_or(&self.token_hash)
            .to_lowercase();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("invalid admin token_hash: expected 64 hex chars".to_string());
        }
        Ok(hash)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub packages: PackagesConfig,
    /// Bootstrap moderator (optional).
    pub admin: Option<AdminConfig>,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Paths are relative defaults; tests point them at
    /// a temporary directory.
    pub fn for_testing() -> Self {
        Self {
            admin: Some(AdminConfig::for_testing()),
            ..Default::default()
        }
    }

    /// Validate every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.packages.validate()?;
        if let Some(admin) = &self.admin {
            admin.normalized_token_hash()?;
        }
        Ok(())
    }
}
