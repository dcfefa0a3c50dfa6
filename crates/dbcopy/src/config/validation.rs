//! Configuration validation.

use super::{redact_uri, CopyConfig};
use crate::core::identifier::validate_identifier;
use crate::dialect::DialectKind;
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &CopyConfig) -> Result<()> {
    if config.source_uri.trim().is_empty() {
        return Err(CopyError::Config(
            "source URI is required (argument, DBCOPY_SOURCE_URI or source_uri)".into(),
        ));
    }
    if config.target_uri.trim().is_empty() {
        return Err(CopyError::Config(
            "target URI is required (argument, DBCOPY_TARGET_URI or target_uri)".into(),
        ));
    }

    let source = DialectKind::from_uri(&config.source_uri)?;
    let target = DialectKind::from_uri(&config.target_uri)?;

    // Copying a schema onto itself would drop or append to the source.
    if source == target
        && config.source_uri.trim() == config.target_uri.trim()
        && config.source_schema == config.target_schema
    {
        return Err(CopyError::Config(format!(
            "source and target are the same database: {}",
            redact_uri(&config.source_uri)
        )));
    }

    if config.chunk_size == 0 {
        return Err(CopyError::Config("chunk_size must be at least 1".into()));
    }

    if let Some(prefix) = config.prefix.as_deref().filter(|p| !p.is_empty()) {
        validate_identifier(prefix)
            .map_err(|e| CopyError::Config(format!("invalid prefix '{}': {}", prefix, e)))?;
    }

    for schema in [&config.source_schema, &config.target_schema]
        .into_iter()
        .flatten()
    {
        validate_identifier(schema)?;
    }

    if config.skip.iter().any(|s| s.trim().is_empty()) {
        return Err(CopyError::Config("skip entries must not be empty".into()));
    }

    Ok(())
}
