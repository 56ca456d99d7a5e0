use crate::config::Config;
use crate::error::{HindsightError, Result, ValidationError};

/// Snippet context windows beyond this are rejected by FTS5
const MAX_SNIPPET_TOKENS: u32 = 64;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_stores(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_tags(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HindsightError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_stores(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.stores.archive_db.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "stores.archive_db",
                "Archive database path cannot be empty",
            ));
        }

        if config.stores.semantic_db.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "stores.semantic_db",
                "Semantic database path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let endpoint = &config.embedding.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            errors.push(ValidationError::new(
                "embedding.endpoint",
                format!("Endpoint must be an http(s) URL, got '{}'", endpoint),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        for (path, value) in [
            ("search.lexical_limit", search.lexical_limit),
            ("search.semantic_limit", search.semantic_limit),
            ("search.top", search.top),
            ("search.preview_max_chars", search.preview_max_chars),
            ("search.max_conversations", search.max_conversations),
            ("search.hits_per_conversation", search.hits_per_conversation),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(
                    path,
                    "Value must be greater than 0",
                ));
            }
        }

        let tokens = search.snippet.tokens;
        if tokens == 0 || tokens > MAX_SNIPPET_TOKENS {
            errors.push(ValidationError::new(
                "search.snippet.tokens",
                format!(
                    "Snippet window must be between 1 and {} tokens, got {}",
                    MAX_SNIPPET_TOKENS, tokens
                ),
            ));
        }
    }

    fn validate_tags(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is deliberately not checked: a missing rule file is a
        // documented degraded mode, not a configuration error.
        if config.tags.rules_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "tags.rules_file",
                "Tag rules file path cannot be empty",
            ));
        }
    }
}
