//! API-key resolution: one strategy, evaluated once at startup.
//!
//! Precedence: explicit CLI value, then environment variable, then a key
//! file (stand-in for a mounted secret). Collaborators receive the opaque
//! token and never re-derive it.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Opaque API token. Redacted in debug output so it never lands in logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(..redacted..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Flag,
    Environment,
    KeyFile,
}

#[derive(Debug)]
pub struct ResolvedKey {
    pub key: ApiKey,
    pub source: KeySource,
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("no API key found: checked --api-key, ${env_var}, and ${file_env}")]
    NotFound { env_var: String, file_env: String },
    #[error("reading key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ApiKeyResolver {
    explicit: Option<String>,
    env_var: String,
    file_env: String,
}

impl ApiKeyResolver {
    pub fn new(env_var: impl Into<String>, file_env: impl Into<String>) -> Self {
        Self {
            explicit: None,
            env_var: env_var.into(),
            file_env: file_env.into(),
        }
    }

    pub fn with_explicit(mut self, value: Option<String>) -> Self {
        self.explicit = value.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn resolve(&self) -> Result<ResolvedKey, SecretError> {
        self.resolve_with(
            |var| std::env::var(var).ok(),
            |path| std::fs::read_to_string(path),
        )
    }

    fn resolve_with<L, R>(&self, lookup_env: L, read_file: R) -> Result<ResolvedKey, SecretError>
    where
        L: Fn(&str) -> Option<String>,
        R: Fn(&Path) -> std::io::Result<String>,
    {
        if let Some(value) = &self.explicit {
            return Ok(ResolvedKey {
                key: ApiKey::new(value.trim()),
                source: KeySource::Flag,
            });
        }

        if let Some(value) = lookup_env(&self.env_var).filter(|v| !v.trim().is_empty()) {
            return Ok(ResolvedKey {
                key: ApiKey::new(value.trim()),
                source: KeySource::Environment,
            });
        }

        if let Some(path) = lookup_env(&self.file_env).filter(|v| !v.trim().is_empty()) {
            let path = PathBuf::from(path);
            let contents = read_file(&path).map_err(|source| SecretError::KeyFile {
                path: path.clone(),
                source,
            })?;
            return Ok(ResolvedKey {
                key: ApiKey::new(contents.trim()),
                source: KeySource::KeyFile,
            });
        }

        Err(SecretError::NotFound {
            env_var: self.env_var.clone(),
            file_env: self.file_env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ApiKeyResolver {
        ApiKeyResolver::new("TEST_API_KEY", "TEST_API_KEY_FILE")
    }

    #[test]
    fn explicit_value_wins() {
        let resolved = resolver()
            .with_explicit(Some("sk-flag".into()))
            .resolve_with(
                |_| Some("sk-env".into()),
                |_| Ok("sk-file".into()),
            )
            .unwrap();
        assert_eq!(resolved.key.as_str(), "sk-flag");
        assert_eq!(resolved.source, KeySource::Flag);
    }

    #[test]
    fn environment_beats_key_file() {
        let resolved = resolver()
            .resolve_with(
                |var| match var {
                    "TEST_API_KEY" => Some(" sk-env \n".into()),
                    _ => Some("/tmp/key".into()),
                },
                |_| Ok("sk-file".into()),
            )
            .unwrap();
        assert_eq!(resolved.key.as_str(), "sk-env");
        assert_eq!(resolved.source, KeySource::Environment);
    }

    #[test]
    fn key_file_is_last_resort() {
        let resolved = resolver()
            .resolve_with(
                |var| match var {
                    "TEST_API_KEY_FILE" => Some("/secrets/openai".into()),
                    _ => None,
                },
                |path| {
                    assert_eq!(path, Path::new("/secrets/openai"));
                    Ok("sk-file\n".into())
                },
            )
            .unwrap();
        assert_eq!(resolved.key.as_str(), "sk-file");
        assert_eq!(resolved.source, KeySource::KeyFile);
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let err = resolver()
            .resolve_with(|_| None, |_| Ok(String::new()))
            .unwrap_err();
        assert!(matches!(err, SecretError::NotFound { .. }));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(..redacted..)");
    }
}
