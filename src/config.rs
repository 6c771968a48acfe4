use crate::posted::DEFAULT_RECORD_FILE;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub x: XCredentials,
    #[serde(default)]
    pub caption: CaptionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Clone, Deserialize)]
pub struct XCredentials {
    pub api_key: String,
    pub api_key_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for XCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XCredentials")
            .field("api_key", &"***REDACTED***")
            .field("api_key_secret", &"***REDACTED***")
            .field("access_token", &"***REDACTED***")
            .field("access_token_secret", &"***REDACTED***")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".into(),
            model: "llama3.2-vision".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub image_dir: PathBuf,
    /// Defaults to `uploaded_images.txt` inside `image_dir`.
    pub record_file: Option<PathBuf>,
    pub batch_size: usize,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("."),
            record_file: None,
            batch_size: 5,
            min_delay_secs: 30.0,
            max_delay_secs: 60.0,
        }
    }
}

impl UploadConfig {
    pub fn record_path(&self) -> PathBuf {
        self.record_file
            .clone()
            .unwrap_or_else(|| self.image_dir.join(DEFAULT_RECORD_FILE))
    }
}

/// Environment variables that override the credentials in the config file.
const ENV_OVERRIDES: &[&str] = &[
    "AUTOPOST_X_API_KEY",
    "AUTOPOST_X_API_KEY_SECRET",
    "AUTOPOST_X_ACCESS_TOKEN",
    "AUTOPOST_X_ACCESS_TOKEN_SECRET",
];

impl Config {
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields = [
            &mut self.x.api_key,
            &mut self.x.api_key_secret,
            &mut self.x.access_token,
            &mut self.x.access_token_secret,
        ];
        for (var, field) in ENV_OVERRIDES.iter().zip(fields) {
            if let Some(value) = lookup(*var) {
                tracing::debug!("Using {var} from the environment");
                *field = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.x.api_key.trim().is_empty() {
            return Err("'x.api_key' is empty in config".into());
        }
        if self.x.api_key_secret.trim().is_empty() {
            return Err("'x.api_key_secret' is empty in config".into());
        }
        if self.x.access_token.trim().is_empty() {
            return Err("'x.access_token' is empty in config".into());
        }
        if self.x.access_token_secret.trim().is_empty() {
            return Err("'x.access_token_secret' is empty in config".into());
        }
        if self.caption.host.trim().is_empty() {
            return Err("'caption.host' is empty in config".into());
        }
        if self.caption.timeout_secs == 0 {
            return Err("'caption.timeout_secs' must be at least 1".into());
        }

        let upload = &self.upload;
        if upload.batch_size == 0 {
            return Err("'upload.batch_size' must be at least 1".into());
        }
        for (name, value) in [
            ("min_delay_secs", upload.min_delay_secs),
            ("max_delay_secs", upload.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("'upload.{name}' must be a non-negative number"));
            }
        }
        if upload.min_delay_secs > upload.max_delay_secs {
            return Err("'upload.min_delay_secs' is greater than 'upload.max_delay_secs'".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [x]
        api_key = "k"
        api_key_secret = "ks"
        access_token = "t"
        access_token_secret = "ts"
    "#;

    #[test]
    fn test_defaults_fill_optional_tables() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.caption.host, "http://localhost:11434");
        assert_eq!(config.caption.model, "llama3.2-vision");
        assert_eq!(config.upload.batch_size, 5);
        assert_eq!(config.upload.min_delay_secs, 30.0);
        assert_eq!(config.upload.max_delay_secs, 60.0);
        assert_eq!(
            config.upload.record_path(),
            PathBuf::from(".").join("uploaded_images.txt")
        );
    }

    #[test]
    fn test_explicit_values() {
        let toml = format!(
            "{MINIMAL}\n[upload]\nimage_dir = \"/pics\"\nrecord_file = \"/var/posted.txt\"\nbatch_size = 2\n\
             [caption]\nmodel = \"llava\"\n"
        );
        let config: Config = toml::from_str(&toml).unwrap();

        assert_eq!(config.upload.image_dir, PathBuf::from("/pics"));
        assert_eq!(config.upload.record_path(), PathBuf::from("/var/posted.txt"));
        assert_eq!(config.upload.batch_size, 2);
        assert_eq!(config.upload.max_delay_secs, 60.0);
        assert_eq!(config.caption.model, "llava");
        assert_eq!(config.caption.timeout_secs, 120);
    }

    #[test]
    fn test_missing_credentials_table_fails_to_parse() {
        assert!(toml::from_str::<Config>("[upload]\nbatch_size = 1\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base: Config = toml::from_str(MINIMAL).unwrap();

        let mut config = base.clone();
        config.x.access_token = "  ".into();
        assert!(config.validate().unwrap_err().contains("x.access_token"));

        let mut config = base.clone();
        config.caption.timeout_secs = 0;
        assert!(config.validate().unwrap_err().contains("caption.timeout_secs"));

        let mut config = base.clone();
        config.upload.batch_size = 0;
        assert!(config.validate().unwrap_err().contains("batch_size"));

        let mut config = base.clone();
        config.upload.min_delay_secs = 90.0;
        assert!(config.validate().unwrap_err().contains("min_delay_secs"));

        let mut config = base;
        config.upload.max_delay_secs = f64::NAN;
        assert!(config.validate().unwrap_err().contains("max_delay_secs"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.apply_env_overrides(|var| match var {
            "AUTOPOST_X_API_KEY" => Some("env-key".into()),
            "AUTOPOST_X_ACCESS_TOKEN_SECRET" => Some("env-secret".into()),
            _ => None,
        });

        assert_eq!(config.x.api_key, "env-key");
        assert_eq!(config.x.api_key_secret, "ks");
        assert_eq!(config.x.access_token, "t");
        assert_eq!(config.x.access_token_secret, "env-secret");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let debug = format!("{:?}", config.x);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("\"ks\""));
    }
}
