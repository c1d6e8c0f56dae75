use crate::error::{EtlError, Result};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Runtime configuration, read from a JSON file.
///
/// `username`, `password`, `host`, `port` and `db_name` are required; a file
/// missing any of them is rejected at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EtlConfig {
    pub username: String,
    #[serde(
        serialize_with = "serialize_password",
        deserialize_with = "deserialize_password"
    )]
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub db_name: String,
    /// Staging folder for downloaded monthly files
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    /// Database used to create `db_name` when it does not exist yet
    #[serde(default = "default_maintenance_db")]
    pub maintenance_db: String,
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("data_yellow_taxis")
}

fn default_maintenance_db() -> String {
    "postgres".to_owned()
}

fn serialize_password<S>(_password: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("********")
}

fn deserialize_password<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::new(s.into()))
}

impl EtlConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret()),
            ("host", self.host.as_str()),
            ("db_name", self.db_name.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(EtlError::Config(format!("'{key}' must not be empty")));
            }
        }
        if self.port == 0 {
            return Err(EtlError::Config("'port' must not be 0".to_owned()));
        }
        Ok(())
    }

    /// Connection options for the target database.
    pub fn connect_options(&self) -> PgConnectOptions {
        self.server_options().database(&self.db_name)
    }

    /// Connection options for the maintenance database.
    pub fn maintenance_options(&self) -> PgConnectOptions {
        self.server_options().database(&self.maintenance_db)
    }

    fn server_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "username": "etl",
        "password": "s3cret",
        "host": "localhost",
        "port": 5432,
        "db_name": "ny_taxi"
    }"#;

    #[test]
    fn test_minimal_config_uses_defaults() -> Result<()> {
        let config = EtlConfig::from_json(MINIMAL)?;
        assert_eq!(config.data_folder, PathBuf::from("data_yellow_taxis"));
        assert_eq!(config.maintenance_db, "postgres");
        assert_eq!(config.password.expose_secret(), "s3cret");
        assert_eq!(config.connect_options().get_database(), Some("ny_taxi"));
        Ok(())
    }

    #[test]
    fn test_missing_required_key() {
        let json = r#"{"username": "etl", "password": "x", "host": "h", "port": 5432}"#;
        let err = EtlConfig::from_json(json).expect_err("db_name is required");
        assert!(matches!(err, EtlError::Config(msg) if msg.contains("db_name")));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let json = MINIMAL.replace("\"etl\"", "\"  \"");
        let err = EtlConfig::from_json(&json).expect_err("blank username");
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_password_is_not_serialized() -> Result<()> {
        let config = EtlConfig::from_json(MINIMAL)?;
        let json = serde_json::to_string(&config)?;
        assert!(!json.contains("s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
        Ok(())
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, MINIMAL)?;
        assert_eq!(EtlConfig::from_file(&path)?.port, 5432);

        let missing = EtlConfig::from_file(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(EtlError::Config(_))));
        Ok(())
    }
}
