//! Provider config validation
//!
//! The graph builder and registry only ever see validated configs.

use crate::error::ValidationError;
use crate::model::ProviderConfig;

const MAX_IDENTIFIER_LEN: usize = 63;

/// Validates and normalizes a raw provider config
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, config: ProviderConfig) -> Result<ProviderConfig, ValidationError>;
}

/// Checks the fixed fields every provider config has
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierValidator;

impl ConfigValidator for IdentifierValidator {
    fn validate(&self, config: ProviderConfig) -> Result<ProviderConfig, ValidationError> {
        check_identifier(&config.name)
            .map_err(|message| ValidationError::new(&config.name, "name", message))?;

        if let Some(envs) = &config.environments {
            for (i, env) in envs.iter().enumerate() {
                check_identifier(env).map_err(|message| {
                    ValidationError::new(&config.name, format!("environments[{i}]"), message)
                })?;
            }
        }

        Ok(config)
    }
}

/// Identifier rule: lowercase letters, digits and single dashes, at most 63
/// characters, not purely numeric, no leading or trailing dash.
pub fn check_identifier(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("must be at most {MAX_IDENTIFIER_LEN} characters"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(format!(
            "may only contain lowercase letters, digits and dashes (found '{c}')"
        ));
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Err("must not consist of digits only".to_string());
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err("must not start or end with a dash".to_string());
    }
    if value.contains("--") {
        return Err("must not contain consecutive dashes".to_string());
    }
    Ok(())
}
