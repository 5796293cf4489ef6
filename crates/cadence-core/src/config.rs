//! Configuration module
//!
//! Pipeline configuration read from the process environment. Every entry point
//! builds one [`Config`] at startup and hands the pieces to the clients it
//! constructs; nothing else reads environment variables.

use std::env;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
/// Five seconds shorter than the 60s platform timeout of a stage invocation
const STAGE_DEADLINE_SECS: u64 = 55;
const DEFAULT_AUDIO_EXTENSION: &str = ".mp3";
const HLS_OUTPUT_PREFIX: &str = "hls";
const HLS_RENDITIONS: &str = "96000,192000,320000";
const LOCAL_BUCKET_NAME: &str = "cadence-local";

/// External ABR encoder settings. Present only when endpoint, role and
/// output bucket are all configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub endpoint: String,
    pub role_arn: String,
    pub queue: Option<String>,
    pub output_bucket: String,
    pub output_prefix: String,
    /// Audio bitrates of the HLS ladder, taken verbatim
    pub renditions: Vec<u32>,
    pub region: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub media_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // S3-compatible providers (MinIO, LocalStack)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    // Pipeline configuration
    pub default_audio_extension: String,
    pub stage_deadline_secs: u64,
    pub hls_output_prefix: String,
    pub encoder: Option<EncoderConfig>,
    pub environment: String,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage_backend = var("STORAGE_BACKEND", "s3").parse::<StorageBackend>()?;

        let mut default_audio_extension = var("DEFAULT_AUDIO_EXTENSION", DEFAULT_AUDIO_EXTENSION);
        if !default_audio_extension.starts_with('.') {
            default_audio_extension.insert(0, '.');
        }

        let hls_output_prefix = var("HLS_OUTPUT_PREFIX", HLS_OUTPUT_PREFIX)
            .trim_matches('/')
            .to_string();

        let renditions = var("HLS_RENDITIONS", HLS_RENDITIONS)
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("HLS_RENDITIONS entry '{}' is not a bitrate", s))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let media_bucket = lookup("MEDIA_BUCKET").filter(|b| !b.is_empty());
        let s3_region = lookup("S3_REGION");
        let aws_region = lookup("AWS_REGION");

        let encoder = match (
            lookup("MEDIACONVERT_ENDPOINT").filter(|v| !v.is_empty()),
            lookup("MEDIACONVERT_ROLE").filter(|v| !v.is_empty()),
            media_bucket.clone(),
        ) {
            (Some(endpoint), Some(role_arn), Some(output_bucket)) => Some(EncoderConfig {
                endpoint,
                role_arn,
                queue: lookup("MEDIACONVERT_QUEUE").filter(|v| !v.is_empty()),
                output_bucket,
                output_prefix: hls_output_prefix.clone(),
                renditions,
                region: s3_region.clone().or_else(|| aws_region.clone()),
            }),
            _ => None,
        };

        let config = Config {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: var("DB_MAX_CONNECTIONS", &MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS", &CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            media_bucket,
            s3_region,
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_region,
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            default_audio_extension,
            stage_deadline_secs: var("STAGE_DEADLINE_SECS", &STAGE_DEADLINE_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("STAGE_DEADLINE_SECS must be a valid number"))?,
            hls_output_prefix,
            encoder,
            environment: var("ENVIRONMENT", "development"),
            log_format: var("LOG_FORMAT", "pretty"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.stage_deadline_secs == 0 {
            return Err(anyhow::anyhow!("STAGE_DEADLINE_SECS must be greater than 0"));
        }

        if self.default_audio_extension.len() < 2 || self.default_audio_extension.contains('/') {
            return Err(anyhow::anyhow!(
                "DEFAULT_AUDIO_EXTENSION must look like '.mp3', got '{}'",
                self.default_audio_extension
            ));
        }

        // Validate storage backend configuration
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.media_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "MEDIA_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        if let Some(encoder) = &self.encoder {
            if encoder.renditions.is_empty() {
                return Err(anyhow::anyhow!(
                    "HLS_RENDITIONS must list at least one bitrate when the encoder is configured"
                ));
            }
        }

        Ok(())
    }

    pub fn stage_deadline(&self) -> Duration {
        Duration::from_secs(self.stage_deadline_secs)
    }

    /// Region for AWS clients, S3_REGION taking precedence
    pub fn region(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }

    /// Bucket name stage payloads must refer to
    pub fn bucket_name(&self) -> &str {
        self.media_bucket.as_deref().unwrap_or(LOCAL_BUCKET_NAME)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/cadence"),
        ("MEDIA_BUCKET", "cadence-media"),
        ("AWS_REGION", "us-east-1"),
    ];

    #[test]
    fn defaults_apply() {
        let config = config_with(BASE).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.default_audio_extension, ".mp3");
        assert_eq!(config.stage_deadline(), Duration::from_secs(55));
        assert_eq!(config.hls_output_prefix, "hls");
        assert_eq!(config.db_max_connections, MAX_CONNECTIONS);
        assert_eq!(config.region(), Some("us-east-1"));
        assert_eq!(config.bucket_name(), "cadence-media");
        assert!(config.encoder.is_none());
    }

    #[test]
    fn database_url_is_required() {
        let err = config_with(&[("MEDIA_BUCKET", "b"), ("AWS_REGION", "r")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn s3_backend_requires_bucket() {
        let err = config_with(&[("DATABASE_URL", "postgres://x"), ("AWS_REGION", "r")])
            .unwrap_err();
        assert!(err.to_string().contains("MEDIA_BUCKET"));
    }

    #[test]
    fn local_backend_requires_path() {
        let err = config_with(&[
            ("DATABASE_URL", "postgres://x"),
            ("STORAGE_BACKEND", "local"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("LOCAL_STORAGE_PATH"));

        let config = config_with(&[
            ("DATABASE_URL", "postgres://x"),
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/tmp/cadence"),
        ])
        .unwrap();
        assert_eq!(config.bucket_name(), LOCAL_BUCKET_NAME);
    }

    #[test]
    fn encoder_needs_endpoint_role_and_bucket() {
        let mut vars = BASE.to_vec();
        vars.push(("MEDIACONVERT_ENDPOINT", "https://mc.example.com"));
        assert!(config_with(&vars).unwrap().encoder.is_none());

        vars.push(("MEDIACONVERT_ROLE", "arn:aws:iam::1:role/mc"));
        vars.push(("HLS_RENDITIONS", "64000, 128000"));
        let encoder = config_with(&vars).unwrap().encoder.unwrap();
        assert_eq!(encoder.output_bucket, "cadence-media");
        assert_eq!(encoder.output_prefix, "hls");
        assert_eq!(encoder.renditions, vec![64000, 128000]);
        assert_eq!(encoder.queue, None);
    }

    #[test]
    fn extension_gets_leading_dot() {
        let mut vars = BASE.to_vec();
        vars.push(("DEFAULT_AUDIO_EXTENSION", "flac"));
        assert_eq!(config_with(&vars).unwrap().default_audio_extension, ".flac");
    }

    #[test]
    fn bad_rendition_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("HLS_RENDITIONS", "96k"));
        assert!(config_with(&vars).is_err());
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("STAGE_DEADLINE_SECS", "0"));
        assert!(config_with(&vars).is_err());
    }
}
