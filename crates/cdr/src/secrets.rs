//! Secret resolution for service credentials.
//!
//! A [`SecretSource`] names where a credential lives, in priority order:
//!
//! 1. **Direct value** - for local testing
//! 2. **File reference** - mounted secrets (e.g. `/run/secrets/ncbi_key`)
//! 3. **Env var reference** - deployment environments

use std::fs;

use secrecy::SecretString;

use crate::config::SecretSource;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Resolves a credential from its configured source.
pub fn resolve_secret(source: &SecretSource) -> Result<SecretString, SecretError> {
    if let Some(ref value) = source.value {
        if !value.is_empty() {
            return Ok(SecretString::from(value.clone()));
        }
    }

    if let Some(ref path) = source.file {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return fs::read_to_string(&expanded)
                .map(|content| SecretString::from(content.trim().to_string()))
                .map_err(|e| SecretError::FileReadError {
                    path: expanded,
                    source: e,
                });
        }
    }

    if let Some(ref var_name) = source.env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.clone(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.clone(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an unconfigured source yields `None`.
pub fn resolve_secret_optional(source: &SecretSource) -> Result<Option<SecretString>, SecretError> {
    if source.is_empty() {
        return Ok(None);
    }
    resolve_secret(source).map(Some)
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_direct_value_wins() {
        let source = SecretSource {
            value: Some("direct".to_string()),
            file: Some("/nonexistent".to_string()),
            env_var: Some("CDR_TEST_UNUSED".to_string()),
        };
        assert_eq!(resolve_secret(&source).unwrap().expose_secret(), "direct");
    }

    #[test]
    fn test_file_source_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let source = SecretSource {
            file: Some(file.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_secret(&source).unwrap().expose_secret(), "from-file");
    }

    #[test]
    #[serial]
    fn test_env_source() {
        std::env::set_var("CDR_TEST_SECRET", "from-env\n");
        let source = SecretSource {
            env_var: Some("CDR_TEST_SECRET".to_string()),
            ..Default::default()
        };
        let secret = resolve_secret(&source).unwrap();
        std::env::remove_var("CDR_TEST_SECRET");
        assert_eq!(secret.expose_secret(), "from-env");
    }

    #[test]
    #[serial]
    fn test_missing_env_var() {
        std::env::remove_var("CDR_TEST_MISSING");
        let source = SecretSource {
            env_var: Some("CDR_TEST_MISSING".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_secret(&source),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[test]
    fn test_optional_empty_source() {
        assert!(resolve_secret_optional(&SecretSource::default())
            .unwrap()
            .is_none());
        assert!(matches!(
            resolve_secret(&SecretSource::default()),
            Err(SecretError::NoSourceProvided)
        ));
    }
}
