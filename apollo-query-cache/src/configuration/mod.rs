//! Cache configuration.
//!
//! The configuration selects which extensions a [`crate::QueryCache`] runs, in a fixed order:
//! entity normalization first, then session validation.
use std::str::FromStr;
use std::sync::Arc;

use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::extension::Extension;
use crate::plugins::NormalizeEntities;
use crate::plugins::NormalizeEntitiesConfig;
use crate::plugins::SessionValidation;
use crate::plugins::SessionValidationConfig;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),

    /// {message}: {error}
    InvalidConfiguration {
        /// What was being validated.
        message: &'static str,
        /// Why it is invalid.
        error: String,
    },
}

/// The configuration of the cache.
///
/// Can be created through `serde::Deserialize` from various formats, or parsed from YAML with
/// [`str::parse`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Entity normalization.
    #[serde(default)]
    pub normalize_entities: NormalizeEntitiesConfig,

    /// Session staleness tracking. Disabled when absent.
    #[serde(default)]
    pub session_validation: Option<SessionValidationConfig>,
}

impl Configuration {
    /// The extensions to run, in order.
    pub fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        let mut extensions: Vec<Arc<dyn Extension>> = Vec::new();
        if self.normalize_entities.enabled {
            extensions.push(Arc::new(NormalizeEntities::new()));
        }
        if let Some(session_validation) = &self.session_validation {
            extensions.push(Arc::new(SessionValidation::new(
                session_validation.session_id.clone(),
            )));
        }
        extensions
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(session_validation) = &self.session_validation
            && session_validation.session_id.trim().is_empty()
        {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid 'session_validation.session_id'",
                error: "the session id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_configuration(s)
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings
        .into_generator()
        .into_root_schema_for::<Configuration>()
}

/// Parses and validates YAML configuration. An empty document is the default configuration.
pub fn validate_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    let raw_yaml = if raw_yaml.trim().is_empty() {
        "{}"
    } else {
        raw_yaml
    };

    let configuration: Configuration =
        serde_yaml::from_str(raw_yaml).map_err(ConfigurationError::DeserializeConfigError)?;
    configuration.validate()?;
    tracing::debug!(
        extensions = configuration.extensions().len(),
        "cache configuration loaded"
    );
    Ok(configuration)
}
