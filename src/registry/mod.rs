//! Target registry.
//!
//! Parses the targets file into validated, immutable [`Target`]s. A load either
//! yields a complete registry or fails with a [`ConfigError`]; there is no
//! partial result.

mod models;

pub use models::*;

use crate::config::ServerConfig;

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::{Host, Url};

/// Configuration errors. Any of these fails the whole load.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse targets file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("target {name:?}: invalid uri {uri:?}: {reason}")]
    InvalidUri {
        name: String,
        uri: String,
        reason: String,
    },
    #[error("target {name:?}: unsupported scheme {scheme:?}, use http://, https:// or tcp://")]
    UnsupportedScheme { name: String, scheme: String },
    #[error("target {name:?}: threshold_seconds must be positive, got {value}")]
    InvalidThreshold { name: String, value: f64 },
    #[error("{scope}: {field} must be a positive number of seconds, got {value}")]
    InvalidDuration {
        scope: String,
        field: &'static str,
        value: f64,
    },
    #[error("target {0:?}: method is only valid for http(s) targets")]
    MethodOnTcp(String),
    #[error("target name must not be empty")]
    EmptyName,
    #[error("duplicate target name {0:?}")]
    DuplicateName(String),
}

/// Interval and timeout used when neither the file nor the target sets one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Defaults {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Defaults {
    /// Defaults taken from the environment-derived server config.
    pub fn from_config(cfg: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            interval: seconds("environment", "SCRAPE_INTERVAL_SECONDS", cfg.scrape_interval_seconds)?,
            timeout: seconds("environment", "REQUEST_TIMEOUT_SECONDS", cfg.request_timeout_seconds)?,
        })
    }
}

/// A validated set of targets.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: Vec<Arc<Target>>,
}

impl Registry {
    /// Load and validate the targets file at `path`.
    pub fn load(path: &Path, defaults: Defaults) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, defaults)
    }

    /// Parse and validate targets from TOML text.
    pub fn from_toml_str(raw: &str, defaults: Defaults) -> Result<Self, ConfigError> {
        let file: TargetsFile = toml::from_str(raw)?;
        Self::from_file(file, defaults)
    }

    /// Validate an already-deserialized targets file.
    pub fn from_file(file: TargetsFile, defaults: Defaults) -> Result<Self, ConfigError> {
        let interval = match file.interval_seconds {
            Some(v) => seconds("targets file", "interval_seconds", v)?,
            None => defaults.interval,
        };
        let timeout = match file.request_timeout_seconds {
            Some(v) => seconds("targets file", "request_timeout_seconds", v)?,
            None => defaults.timeout,
        };

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(file.targets.len());

        for spec in file.targets {
            let target = build_target(spec, interval, timeout)?;
            if !seen.insert(target.name.clone()) {
                return Err(ConfigError::DuplicateName(target.name));
            }
            targets.push(Arc::new(target));
        }

        Ok(Self { targets })
    }

    /// Build a registry from already-resolved targets, skipping validation.
    #[cfg(test)]
    pub fn from_targets(targets: Vec<Target>) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Target>> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> HashSet<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn build_target(
    spec: TargetSpec,
    default_interval: Duration,
    default_timeout: Duration,
) -> Result<Target, ConfigError> {
    let uri = spec.uri.trim().to_string();
    let name = match spec.name {
        Some(n) => n.trim().to_string(),
        None => uri.clone(),
    };
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }

    if !spec.threshold_seconds.is_finite() || spec.threshold_seconds <= 0.0 {
        return Err(ConfigError::InvalidThreshold {
            name,
            value: spec.threshold_seconds,
        });
    }

    let scope = format!("target {:?}", name);
    let interval = match spec.interval_seconds {
        Some(v) => seconds(&scope, "interval_seconds", v)?,
        None => default_interval,
    };
    let timeout = match spec.timeout_seconds {
        Some(v) => seconds(&scope, "timeout_seconds", v)?,
        None => default_timeout,
    };

    let endpoint = parse_endpoint(&name, &uri, spec.method)?;

    Ok(Target {
        name,
        uri,
        endpoint,
        threshold_seconds: spec.threshold_seconds,
        interval,
        timeout,
    })
}

fn parse_endpoint(
    name: &str,
    uri: &str,
    method: Option<HttpMethod>,
) -> Result<Endpoint, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUri {
        name: name.to_string(),
        uri: uri.to_string(),
        reason,
    };

    let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {
            if url.host().is_none() {
                return Err(invalid("missing host".to_string()));
            }
            Ok(Endpoint::Http {
                url,
                method: method.unwrap_or_default(),
            })
        }
        "tcp" => {
            if method.is_some() {
                return Err(ConfigError::MethodOnTcp(name.to_string()));
            }
            let host = match url.host() {
                Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
                Some(Host::Ipv4(addr)) => addr.to_string(),
                Some(Host::Ipv6(addr)) => addr.to_string(),
                _ => return Err(invalid("tcp:// requires host:port".to_string())),
            };
            let port = url
                .port()
                .ok_or_else(|| invalid("tcp:// requires host:port".to_string()))?;
            Ok(Endpoint::Tcp { host, port })
        }
        other => Err(ConfigError::UnsupportedScheme {
            name: name.to_string(),
            scheme: other.to_string(),
        }),
    }
}

fn seconds(scope: &str, field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        scope: scope.to_string(),
        field,
        value,
    };
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(invalid()),
    }
}

/// The active registry plus where it is loaded from.
///
/// `reload` re-reads the file and swaps the active registry atomically. Readers
/// holding an `Arc<Registry>` (or an `Arc<Target>` taken from it) keep their
/// snapshot.
pub struct RegistrySource {
    path: PathBuf,
    defaults: Defaults,
    current: RwLock<Arc<Registry>>,
}

impl RegistrySource {
    /// Perform the initial load. Fails if the file is missing or invalid.
    pub fn load(path: impl Into<PathBuf>, defaults: Defaults) -> Result<Self, ConfigError> {
        let path = path.into();
        let registry = Registry::load(&path, defaults)?;
        Ok(Self {
            path,
            defaults,
            current: RwLock::new(Arc::new(registry)),
        })
    }

    /// Wrap an in-memory registry with no backing file semantics beyond `path`.
    #[cfg(test)]
    pub fn with_registry(path: impl Into<PathBuf>, defaults: Defaults, registry: Registry) -> Self {
        Self {
            path: path.into(),
            defaults,
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// Re-read the file. On error the previous registry stays active.
    pub fn reload(&self) -> Result<Arc<Registry>, ConfigError> {
        let registry = Arc::new(Registry::load(&self.path, self.defaults)?);
        *self.current.write() = registry.clone();
        Ok(registry)
    }

    pub fn current(&self) -> Arc<Registry> {
        self.current.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
interval_seconds = 10

[[targets]]
name = "api"
uri = "https://api.example.com/health"
threshold_seconds = 0.5

[[targets]]
name = "db"
uri = "tcp://db.internal:5432"
threshold_seconds = 0.1
interval_seconds = 30
timeout_seconds = 2

[[targets]]
url = "http://example.org"
threshold_seconds = 1
method = "HEAD"
"#;

    #[test]
    fn test_load_sample() {
        let reg = Registry::from_toml_str(SAMPLE, Defaults::default()).unwrap();
        assert_eq!(reg.len(), 3);

        let api = reg.get("api").unwrap();
        assert_eq!(api.endpoint.scheme(), "http");
        assert_eq!(api.threshold_seconds, 0.5);
        assert_eq!(api.interval, Duration::from_secs(10));
        assert_eq!(api.timeout, Duration::from_secs(5));

        let db = reg.get("db").unwrap();
        assert_eq!(
            db.endpoint,
            Endpoint::Tcp {
                host: "db.internal".to_string(),
                port: 5432
            }
        );
        assert_eq!(db.interval, Duration::from_secs(30));
        assert_eq!(db.timeout, Duration::from_secs(2));

        // Name defaults to the uri
        let unnamed = reg.get("http://example.org").unwrap();
        match &unnamed.endpoint {
            Endpoint::Http { method, .. } => assert_eq!(*method, HttpMethod::Head),
            other => panic!("unexpected endpoint {:?}", other),
        }
    }

    #[test]
    fn test_env_defaults_apply_without_file_values() {
        let defaults = Defaults {
            interval: Duration::from_secs(60),
            timeout: Duration::from_millis(1500),
        };
        let raw = r#"
[[targets]]
name = "a"
uri = "tcp://127.0.0.1:80"
threshold_seconds = 1
"#;
        let reg = Registry::from_toml_str(raw, defaults).unwrap();
        let t = reg.get("a").unwrap();
        assert_eq!(t.interval, Duration::from_secs(60));
        assert_eq!(t.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_ipv6_tcp_host() {
        let raw = r#"
[[targets]]
name = "v6"
uri = "tcp://[::1]:8080"
threshold_seconds = 1
"#;
        let reg = Registry::from_toml_str(raw, Defaults::default()).unwrap();
        assert_eq!(
            reg.get("v6").unwrap().endpoint,
            Endpoint::Tcp {
                host: "::1".to_string(),
                port: 8080
            }
        );
    }

    fn load_err(raw: &str) -> ConfigError {
        Registry::from_toml_str(raw, Defaults::default()).unwrap_err()
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = load_err(
            r#"
[[targets]]
name = "ok"
uri = "http://a.example"
threshold_seconds = 1

[[targets]]
name = "bad"
uri = "http://b.example"
threshold_seconds = 0
"#,
        );
        assert!(matches!(err, ConfigError::InvalidThreshold { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = load_err(
            r#"
[[targets]]
name = "ftp"
uri = "ftp://files.example"
threshold_seconds = 1
"#,
        );
        assert!(matches!(err, ConfigError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn test_rejects_malformed_uri() {
        let err = load_err(
            r#"
[[targets]]
name = "junk"
uri = "not a uri"
threshold_seconds = 1
"#,
        );
        assert!(matches!(err, ConfigError::InvalidUri { .. }));

        let err = load_err(
            r#"
[[targets]]
name = "noport"
uri = "tcp://db.internal"
threshold_seconds = 1
"#,
        );
        assert!(matches!(err, ConfigError::InvalidUri { .. }));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = load_err(
            r#"
[[targets]]
name = "x"
uri = "http://a.example"
threshold_seconds = 1

[[targets]]
name = "x"
uri = "tcp://a.example:22"
threshold_seconds = 1
"#,
        );
        assert!(matches!(err, ConfigError::DuplicateName(ref n) if n == "x"));
    }

    #[test]
    fn test_rejects_missing_threshold_and_bad_durations() {
        let err = load_err(
            r#"
[[targets]]
name = "x"
uri = "http://a.example"
"#,
        );
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = load_err(
            r#"
[[targets]]
name = "x"
uri = "http://a.example"
threshold_seconds = 1
timeout_seconds = -3
"#,
        );
        assert!(matches!(err, ConfigError::InvalidDuration { field: "timeout_seconds", .. }));
    }

    #[test]
    fn test_rejects_sub_nanosecond_interval() {
        let err = load_err(
            r#"
[[targets]]
name = "t"
uri = "tcp://127.0.0.1:9"
threshold_seconds = 1
interval_seconds = 1e-10
"#,
        );
        assert!(matches!(err, ConfigError::InvalidDuration { field: "interval_seconds", .. }));

        let err = load_err(
            r#"
request_timeout_seconds = 1e-12

[[targets]]
uri = "tcp://127.0.0.1:9"
threshold_seconds = 1
"#,
        );
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "request_timeout_seconds", .. }
        ));
    }

    #[test]
    fn test_rejects_method_on_tcp() {
        let err = load_err(
            r#"
[[targets]]
name = "db"
uri = "tcp://db:5432"
threshold_seconds = 1
method = "HEAD"
"#,
        );
        assert!(matches!(err, ConfigError::MethodOnTcp(_)));
    }

    #[test]
    fn test_source_reload_keeps_previous_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();

        let source = RegistrySource::load(file.path(), Defaults::default()).unwrap();
        let before = source.current();
        assert_eq!(before.len(), 3);

        std::fs::write(file.path(), "[[targets]]\nuri = \"gopher://x\"\nthreshold_seconds = 1\n").unwrap();
        assert!(source.reload().is_err());
        assert_eq!(source.current().len(), 3);

        std::fs::write(
            file.path(),
            "[[targets]]\nname = \"only\"\nuri = \"tcp://127.0.0.1:1\"\nthreshold_seconds = 2\n",
        )
        .unwrap();
        let after = source.reload().unwrap();
        assert_eq!(after.len(), 1);
        assert!(source.current().get("only").is_some());

        // Snapshot taken before the reload is untouched
        assert_eq!(before.len(), 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Registry::load(Path::new("/nonexistent/targets.toml"), Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
