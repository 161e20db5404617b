//! TOML-based configuration for the broke identity broker.
//!
//! A configuration declares the user sources to read identities from and the
//! user targets to reconcile them into. All credentials are stored as `_env`
//! fields that reference environment variable names; the actual secrets are
//! resolved at runtime via [`BrokeConfig::resolve_env_vars`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// Required suffix of every configuration file.
pub const CONFIG_FILE_SUFFIX: &str = ".broke.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a `*.broke.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokeConfig {
    /// Directories users are read from, in declaration order.
    #[serde(default)]
    pub user_sources: Vec<UserSourceConfig>,

    /// Systems whose membership state is reconciled, in declaration order.
    #[serde(default)]
    pub user_targets: Vec<UserTargetConfig>,

    /// HTTP client settings shared by every source and target client.
    #[serde(default)]
    pub http: HttpConfig,
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds (default 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// User sources
// ---------------------------------------------------------------------------

/// One configured user source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSourceConfig {
    /// Unique source name, recorded on every user loaded from it.
    pub name: String,

    /// Keycloak realm to read users from.
    pub keycloak: KeycloakConfig,

    /// How users are loaded.
    #[serde(default)]
    pub load: UserLoadConfig,
}

/// Keycloak connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server (e.g. `https://sso.example.com`).
    pub url: String,

    /// Realm holding the users.
    pub realm: String,

    /// Environment variable holding the admin username.
    pub admin_username_env: String,

    /// Environment variable holding the admin password.
    pub admin_password_env: String,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,

    /// Resolved admin username (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub admin_username: Option<String>,

    /// Resolved admin password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub admin_password: Option<String>,
}

/// Which users of a source are loaded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserLoadType {
    /// Every user of the realm.
    #[default]
    Full,
    /// Reserved; not supported yet.
    Partial,
}

/// User load settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLoadConfig {
    #[serde(rename = "type", default)]
    pub load_type: UserLoadType,
}

// ---------------------------------------------------------------------------
// User targets
// ---------------------------------------------------------------------------

/// One configured user target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTargetConfig {
    /// Unique target name.
    pub name: String,

    /// Kind-specific connection settings and mappings.
    #[serde(flatten)]
    pub kind: TargetKind,
}

/// The closed set of supported target kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Mailcow(MailcowConfig),
    Outline(OutlineConfig),
    Gitlab(GitLabConfig),
}

impl TargetKind {
    /// Short lowercase name of the kind, as used in the config file.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Mailcow(_) => "mailcow",
            Self::Outline(_) => "outline",
            Self::Gitlab(_) => "gitlab",
        }
    }

    /// Base URL of the target API.
    pub fn url(&self) -> &str {
        match self {
            Self::Mailcow(c) => &c.url,
            Self::Outline(c) => &c.url,
            Self::Gitlab(c) => &c.url,
        }
    }

    /// Number of configured mappings.
    pub fn mapping_count(&self) -> usize {
        match self {
            Self::Mailcow(c) => c.mappings.len(),
            Self::Outline(c) => c.mappings.len(),
            Self::Gitlab(c) => c.mappings.len(),
        }
    }
}

/// Match criteria shared by the mappings of every target kind.
///
/// A user satisfies the criteria when they hold `group` or `role`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Accepted but not evaluated yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usernames: Option<Vec<String>>,
}

/// Mailcow mail server target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailcowConfig {
    pub url: String,

    /// Environment variable holding the Mailcow API key.
    pub api_key_env: String,

    #[serde(default)]
    pub mappings: Vec<MailcowMapping>,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// "Users matching the criteria get a mailbox at `domain`."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailcowMapping {
    #[serde(flatten)]
    pub criteria: MappingCriteria,

    pub domain: String,

    /// Mailcow `authsource` of created mailboxes (e.g. `keycloak`, `mailcow`).
    pub auth_source: String,
}

/// Outline wiki target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineConfig {
    pub url: String,

    /// Environment variable holding the Outline API token.
    pub api_key_env: String,

    #[serde(default)]
    pub mappings: Vec<OutlineMapping>,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// "Users matching the criteria join `outline_group` and/or get `outline_role`."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineMapping {
    #[serde(flatten)]
    pub criteria: MappingCriteria,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_group: Option<String>,

    /// One of `admin`, `editor`, `viewer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_role: Option<String>,
}

/// GitLab source-control target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    pub url: String,

    /// Environment variable holding a GitLab admin access token.
    pub api_key_env: String,

    #[serde(default)]
    pub mappings: Vec<GitLabMapping>,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// "Users matching the criteria get `access_level` and the group memberships."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabMapping {
    #[serde(flatten)]
    pub criteria: MappingCriteria,

    /// One of `regular`, `administrator`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<String>,

    #[serde(default)]
    pub group_assignments: Vec<GroupAssignment>,
}

/// Membership in one GitLab group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub group: String,

    /// One of `owner`, `maintainer`, `developer`, `reporter`, `guest`.
    pub permission: String,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl BrokeConfig {
    /// Load a [`BrokeConfig`] from a `*.broke.toml` file.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.to_string_lossy().ends_with(CONFIG_FILE_SUFFIX) {
            return Err(ConfigError::InvalidExtension(path.display().to_string()));
        }
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;

        debug!(
            sources = config.user_sources.len(),
            targets = config.user_targets.len(),
            "configuration parsed successfully"
        );
        Ok(config)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables only log a warning here; the client that needs the
    /// secret fails with [`ConfigError::EnvVarMissing`] when it is built.
    pub fn resolve_env_vars(&mut self) {
        info!("resolving environment variable references in config");

        for source in &mut self.user_sources {
            let kc = &mut source.keycloak;
            kc.admin_username =
                resolve_optional_env(&kc.admin_username_env, "keycloak.admin_username_env");
            kc.admin_password =
                resolve_optional_env(&kc.admin_password_env, "keycloak.admin_password_env");
        }

        for target in &mut self.user_targets {
            match &mut target.kind {
                TargetKind::Mailcow(c) => {
                    c.api_key = resolve_optional_env(&c.api_key_env, "mailcow.api_key_env");
                }
                TargetKind::Outline(c) => {
                    c.api_key = resolve_optional_env(&c.api_key_env, "outline.api_key_env");
                }
                TargetKind::Gitlab(c) => {
                    c.api_key = resolve_optional_env(&c.api_key_env, "gitlab.api_key_env");
                }
            }
        }

        debug!("environment variable resolution complete");
    }

    /// Validate structure and names.
    ///
    /// Role, permission and access-level strings inside mappings are checked
    /// by the planner when the mapping is evaluated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_sources.is_empty() {
            return Err(invalid("user_sources", "at least one user source is required"));
        }

        let mut source_names = HashSet::new();
        for source in &self.user_sources {
            if source.name.is_empty() {
                return Err(invalid("user_sources.name", "source name must not be empty"));
            }
            if !source_names.insert(source.name.as_str()) {
                return Err(invalid(
                    "user_sources.name",
                    format!("duplicate user source name '{}'", source.name),
                ));
            }
            check_url("user_sources.keycloak.url", &source.keycloak.url)?;
            if source.keycloak.realm.is_empty() {
                return Err(invalid("user_sources.keycloak.realm", "realm must not be empty"));
            }
            if source.load.load_type == UserLoadType::Partial {
                return Err(invalid(
                    "user_sources.load.type",
                    format!("source '{}': partial user load is not supported", source.name),
                ));
            }
        }

        let mut target_names = HashSet::new();
        for target in &self.user_targets {
            if target.name.is_empty() {
                return Err(invalid("user_targets.name", "target name must not be empty"));
            }
            if !target_names.insert(target.name.as_str()) {
                return Err(invalid(
                    "user_targets.name",
                    format!("duplicate user target name '{}'", target.name),
                ));
            }
            check_url(
                &format!("user_targets.{}.url", target.kind.kind_name()),
                target.kind.url(),
            )?;
        }

        if self.http.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs", "timeout must be > 0"));
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &str, detail: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        detail: detail.into(),
    }
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(invalid(field, "URL must not be empty"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(invalid(field, "URL must start with http:// or https://"));
    }
    Ok(())
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Return a resolved secret or the error naming the variable to set.
pub fn require_secret<'a>(
    value: &'a Option<String>,
    env_name: &str,
    field: &str,
) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or_else(|| ConfigError::EnvVarMissing {
        var: env_name.to_string(),
        field: field.to_string(),
    })
}
