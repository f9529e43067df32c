// dbbackup/src/config/mod.rs
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::errors::{AppError, Result};

/// ASCII characters MySQL allows in unquoted identifiers, plus '-'.
static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_$-]+$").expect("static regex"));

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub s3_storage: Option<JsonS3StorageConfig>,
}

#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Connection settings for the S3-compatible store.
///
/// Anything left unset falls back to the standard AWS environment chain
/// (`AWS_REGION`, `AWS_ACCESS_KEY_ID`, profiles, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub credentials: Option<StaticCredentials>,
    pub folder_prefix: Option<String>,
}

impl StorageConfig {
    /// Loads the `s3_storage` section of a JSON config file.
    ///
    /// A missing file yields the default (empty) configuration.
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(
                path = %config_path.display(),
                "Storage config file not found, using environment defaults"
            );
            return Ok(StorageConfig::default());
        }

        let config_content = fs::read_to_string(config_path)?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content)?;
        Self::from_raw(raw.s3_storage.unwrap_or_default())
    }

    fn from_raw(s3_raw: JsonS3StorageConfig) -> Result<Self> {
        let non_empty = |value: Option<String>| value.filter(|s| !s.trim().is_empty());

        let endpoint_url = non_empty(s3_raw.endpoint_url);
        if let Some(endpoint) = &endpoint_url {
            Url::parse(endpoint)?;
        }

        let credentials = match (
            non_empty(s3_raw.access_key_id),
            non_empty(s3_raw.secret_access_key),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "s3_storage must set both access_key_id and secret_access_key, or neither"
                        .to_string(),
                ));
            }
        };

        Ok(StorageConfig {
            bucket_name: non_empty(s3_raw.bucket_name),
            region: non_empty(s3_raw.region),
            endpoint_url,
            credentials,
            folder_prefix: non_empty(s3_raw.folder_prefix)
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        })
    }
}

/// Everything one run needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub database: String,
    pub credentials_file: PathBuf,
    pub bucket: String,
    pub keep: usize,
    pub folder_prefix: Option<String>,
}

impl BackupRequest {
    /// Validates the inputs before anything is spawned.
    ///
    /// The bucket given on the command line wins over `s3_storage.bucket_name`.
    pub fn new(
        database: String,
        credentials_file: PathBuf,
        bucket: Option<String>,
        keep: usize,
        storage: &StorageConfig,
    ) -> Result<Self> {
        if !DATABASE_NAME.is_match(&database) {
            return Err(AppError::Config(format!(
                "Invalid database name {:?}: expected ASCII letters, digits, '_', '$' or '-'",
                database
            )));
        }

        if !credentials_file.is_file() {
            return Err(AppError::Config(format!(
                "MySQL credentials file not found: {}",
                credentials_file.display()
            )));
        }

        let bucket = bucket
            .filter(|b| !b.trim().is_empty())
            .or_else(|| storage.bucket_name.clone())
            .ok_or_else(|| {
                AppError::Config(
                    "No bucket given: pass --bucket or set s3_storage.bucket_name".to_string(),
                )
            })?;

        Ok(BackupRequest {
            database,
            credentials_file,
            bucket,
            keep,
            folder_prefix: storage.folder_prefix.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn credentials_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nuser=backup\npassword=secret").unwrap();
        file
    }

    #[test]
    fn test_load_full_storage_config() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "s3_storage": {{
                    "bucket_name": "nightly",
                    "region": "nyc3",
                    "access_key_id": "AKIA",
                    "secret_access_key": "shh",
                    "endpoint_url": "https://nyc3.digitaloceanspaces.com",
                    "folder_prefix": "/mysql/"
                }}
            }}"#
        )?;

        let cfg = StorageConfig::load_from_json(file.path())?;
        assert_eq!(cfg.bucket_name.as_deref(), Some("nightly"));
        assert_eq!(cfg.region.as_deref(), Some("nyc3"));
        assert_eq!(
            cfg.endpoint_url.as_deref(),
            Some("https://nyc3.digitaloceanspaces.com")
        );
        assert_eq!(cfg.folder_prefix.as_deref(), Some("mysql"));
        let creds = cfg.credentials.expect("static credentials");
        assert_eq!(creds.access_key_id, "AKIA");
        assert_eq!(creds.secret_access_key, "shh");
        Ok(())
    }

    #[test]
    fn test_missing_config_file_uses_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = StorageConfig::load_from_json(&dir.path().join("config.json"))?;
        assert!(cfg.bucket_name.is_none());
        assert!(cfg.credentials.is_none());
        Ok(())
    }

    #[test]
    fn test_empty_strings_are_ignored() -> anyhow::Result<()> {
        let raw = JsonS3StorageConfig {
            bucket_name: Some(String::new()),
            region: Some("  ".to_string()),
            ..Default::default()
        };
        let cfg = StorageConfig::from_raw(raw)?;
        assert!(cfg.bucket_name.is_none());
        assert!(cfg.region.is_none());
        Ok(())
    }

    #[test]
    fn test_half_credentials_rejected() {
        let raw = JsonS3StorageConfig {
            access_key_id: Some("AKIA".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            StorageConfig::from_raw(raw),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let raw = JsonS3StorageConfig {
            endpoint_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            StorageConfig::from_raw(raw),
            Err(AppError::UrlParse(_))
        ));
    }

    #[test]
    fn test_request_prefers_cli_bucket() -> anyhow::Result<()> {
        let creds = credentials_file();
        let storage = StorageConfig {
            bucket_name: Some("from-config".to_string()),
            folder_prefix: Some("mysql".to_string()),
            ..Default::default()
        };

        let request = BackupRequest::new(
            "shop_prod".to_string(),
            creds.path().to_path_buf(),
            Some("from-cli".to_string()),
            5,
            &storage,
        )?;
        assert_eq!(request.bucket, "from-cli");
        assert_eq!(request.folder_prefix.as_deref(), Some("mysql"));

        let request = BackupRequest::new(
            "shop_prod".to_string(),
            creds.path().to_path_buf(),
            None,
            5,
            &storage,
        )?;
        assert_eq!(request.bucket, "from-config");
        Ok(())
    }

    #[test]
    fn test_request_requires_bucket() {
        let creds = credentials_file();
        let result = BackupRequest::new(
            "shop".to_string(),
            creds.path().to_path_buf(),
            None,
            5,
            &StorageConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_request_rejects_bad_database_names() {
        let creds = credentials_file();
        for name in ["", "shop prod", "../etc", "a/b"] {
            let result = BackupRequest::new(
                name.to_string(),
                creds.path().to_path_buf(),
                Some("bucket".to_string()),
                5,
                &StorageConfig::default(),
            );
            assert!(result.is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_request_accepts_mysql_identifier_characters() -> anyhow::Result<()> {
        let creds = credentials_file();
        for name in ["my$db", "shop-prod", "2024_sales"] {
            let request = BackupRequest::new(
                name.to_string(),
                creds.path().to_path_buf(),
                Some("bucket".to_string()),
                5,
                &StorageConfig::default(),
            )?;
            assert_eq!(request.database, name);
        }
        Ok(())
    }

    #[test]
    fn test_request_requires_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = BackupRequest::new(
            "shop".to_string(),
            dir.path().join(".my.cnf"),
            Some("bucket".to_string()),
            5,
            &StorageConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
