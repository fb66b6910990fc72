use crate::audit_log::{AuditSink, JsonlAuditLog};
use crate::audit_store_sled::SledAuditLog;
use crate::engine::RuntimeSnapshot;
use crate::errors::{GateError, GateResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CONFIG_FILE: &str = "verdict_gate.toml";
pub const ENV_PREFIX: &str = "VERDICT_GATE_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    Jsonl,
    Sled,
}

impl std::str::FromStr for AuditBackend {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(AuditBackend::Jsonl),
            "sled" => Ok(AuditBackend::Sled),
            other => Err(GateError::config(format!("unknown audit backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Jsonl,
            path: PathBuf::from("verdict_audit.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub kill_switch: bool,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl GateConfig {
    /// Defaults, then the TOML file, then `VERDICT_GATE_*` variables
    /// (`__` separates nested keys, e.g. `VERDICT_GATE_AUDIT__PATH`).
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(GateConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> GateResult<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(GateError::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
        }
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> GateResult<Self> {
        let config: GateConfig = figment
            .extract()
            .map_err(|e| GateError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.audit.path.as_os_str().is_empty() {
            return Err(GateError::config("audit.path must not be empty"));
        }
        if self.server.host.trim().is_empty() {
            return Err(GateError::config("server.host must not be empty"));
        }
        Ok(())
    }

    pub fn runtime(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            kill_switch: self.kill_switch,
        }
    }
}

pub fn open_audit_sink(config: &AuditConfig) -> GateResult<Arc<dyn AuditSink>> {
    open_sink(config.backend, &config.path)
}

pub fn open_sink(backend: AuditBackend, path: &Path) -> GateResult<Arc<dyn AuditSink>> {
    Ok(match backend {
        AuditBackend::Jsonl => Arc::new(JsonlAuditLog::new(path)),
        AuditBackend::Sled => Arc::new(SledAuditLog::open(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> GateResult<GateConfig> {
        GateConfig::from_figment(
            Figment::from(Serialized::defaults(GateConfig::default())).merge(Toml::string(source)),
        )
    }

    #[test]
    fn defaults_are_usable() {
        let config = from_toml("").unwrap();
        assert!(!config.kill_switch);
        assert_eq!(config.audit.backend, AuditBackend::Jsonl);
        assert_eq!(config.server.port, 8088);
        assert!(!config.runtime().kill_switch);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            kill_switch = true

            [audit]
            backend = "sled"
            path = "/var/lib/verdict/audit"

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert!(config.runtime().kill_switch);
        assert_eq!(config.audit.backend, AuditBackend::Sled);
        assert_eq!(config.audit.path, PathBuf::from("/var/lib/verdict/audit"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn empty_audit_path_is_rejected() {
        let err = from_toml("[audit]\nbackend = \"jsonl\"\npath = \"\"").unwrap_err();
        assert!(err.to_string().contains("audit.path"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(from_toml("[audit]\nbackend = \"postgres\"\npath = \"x\"").is_err());
        assert!("postgres".parse::<AuditBackend>().is_err());
        assert_eq!("SLED".parse::<AuditBackend>().unwrap(), AuditBackend::Sled);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(GateConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
