//! Configuration errors for the API client

use std::path::PathBuf;

/// Why the client configuration could not be loaded.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Well-formed file with a value the client cannot use.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/api-client.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "reading /etc/api-client.toml: no such file");
    }

    #[test]
    fn parse_error_keeps_toml_source() {
        let source = toml::from_str::<toml::Table>("base_url = ").unwrap_err();
        let err = ConfigError::Parse {
            path: PathBuf::from("api-client.toml"),
            source,
        };
        assert!(err.to_string().starts_with("parsing api-client.toml:"), "got: {err}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::Invalid("timeout_ms must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: timeout_ms must be greater than 0"
        );
    }
}
