//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::copy::CopyOptions;
use crate::error::Result;
use crate::sanitize::Sanitizer;

impl CopyConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file without validating it, so that command-line
    /// overrides can be applied first.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CopyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Sanitization policy selected by `preserve_unicode`.
    pub fn sanitizer(&self) -> Sanitizer {
        if self.preserve_unicode {
            Sanitizer::preserving_unicode()
        } else {
            Sanitizer::default()
        }
    }

    /// Per-table copy options for this run.
    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            chunk_size: self.chunk_size,
            sanitizer: self.sanitizer(),
            cancel: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "source_uri: mysql://app@src/shop\n\
             target_uri: postgres://app@dst/warehouse\n\
             prefix: stg_\n\
             skip: [audit_log]\n\
             normalize_tables: true\n\
             chunk_size: 500"
        )
        .unwrap();

        let config = CopyConfig::load(file.path()).unwrap();
        assert_eq!(config.prefix.as_deref(), Some("stg_"));
        assert!(config.is_skipped("audit_log"));
        assert!(config.normalize_tables);
        assert!(!config.normalize_columns);
        assert_eq!(config.copy_options().chunk_size, 500);
    }

    #[test]
    fn test_read_skips_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prefix: stg_").unwrap();
        assert!(CopyConfig::read(file.path()).is_ok());
        assert!(CopyConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_scheme() {
        let err = CopyConfig::from_yaml("source_uri: sqlite://x\ntarget_uri: postgres://y/z\n")
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_sanitizer_follows_preserve_unicode() {
        let mut config = CopyConfig::new("mysql://a/b", "postgres://c/d");
        assert!(config.sanitizer().transliterate);
        config.preserve_unicode = true;
        assert!(!config.sanitizer().transliterate);
    }
}
