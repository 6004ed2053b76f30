use figment::{
    Figment,
    providers::{Env, Format, Json, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ical::{ParseOptions, Window};

/// Prefix for environment overrides, e.g. `VENDOR_AVAILABILITY_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "VENDOR_AVAILABILITY_";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Zone applied to floating times of every source without its own
    #[serde(default)]
    pub default_timezone: Option<String>,
    pub vendors: HashMap<String, VendorConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// A vendor whose availability is assembled from one or more feeds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One ICS feed exported by a calendar provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub url: String,
    #[serde(default)]
    pub default_timezone: Option<String>,
    #[serde(default)]
    pub include_cancelled: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl SourceConfig {
    /// Parser options for this source; the source's timezone wins over the
    /// config-wide one
    pub fn parse_options(&self, window: Window, fallback_timezone: Option<&str>) -> ParseOptions {
        ParseOptions {
            include_cancelled: self.include_cancelled,
            window,
            default_timezone: self
                .default_timezone
                .clone()
                .or_else(|| fallback_timezone.map(str::to_string)),
        }
    }
}

/// Match mode for allow/deny steps
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

fn default_step_fields() -> Vec<String> {
    vec!["summary".to_string(), "description".to_string()]
}

/// Event selection step
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// Keep only events matching the patterns
    Allow {
        patterns: Vec<String>,
        #[serde(default)]
        mode: MatchMode,
        #[serde(default = "default_step_fields")]
        fields: Vec<String>,
    },
    /// Drop events matching the patterns
    Deny {
        patterns: Vec<String>,
        #[serde(default)]
        mode: MatchMode,
        #[serde(default = "default_step_fields")]
        fields: Vec<String>,
    },
}

const STEP_FIELDS: [&str; 3] = ["summary", "description", "location"];

impl Config {
    /// Load from JSON or TOML (by extension), then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("json");

        let figment = Figment::new();
        let figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            _ => figment.merge(Json::file(path)),
        };

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.vendors.is_empty() {
            return Err(Error::Config("No vendors configured".to_string()));
        }

        if let Some(tz) = &self.default_timezone {
            Self::validate_timezone(tz, "Config")?;
        }

        for (id, vendor) in &self.vendors {
            if vendor.sources.is_empty() {
                return Err(Error::Config(format!("Vendor '{}' has no sources", id)));
            }

            for (idx, source) in vendor.sources.iter().enumerate() {
                let context = format!("Vendor '{}' source {}", id, idx);

                if source.url.trim().is_empty() {
                    return Err(Error::Config(format!("{} has empty URL", context)));
                }
                if let Some(tz) = &source.default_timezone {
                    Self::validate_timezone(tz, &context)?;
                }
                Self::validate_steps(&source.steps, &context)?;
            }

            Self::validate_steps(&vendor.steps, &format!("Vendor '{}'", id))?;
        }

        Ok(())
    }

    fn validate_timezone(name: &str, context: &str) -> Result<()> {
        name.parse::<chrono_tz::Tz>().map(|_| ()).map_err(|_| {
            Error::Config(format!("{} has unknown timezone '{}'", context, name))
        })
    }

    fn validate_steps(steps: &[Step], context: &str) -> Result<()> {
        use regex::Regex;

        for (idx, step) in steps.iter().enumerate() {
            let (Step::Allow {
                patterns, fields, ..
            }
            | Step::Deny {
                patterns, fields, ..
            }) = step;

            if patterns.is_empty() {
                return Err(Error::Config(format!(
                    "{} step {} has no patterns",
                    context, idx
                )));
            }
            for pattern in patterns {
                Regex::new(pattern).map_err(|e| {
                    Error::Config(format!(
                        "{} step {} has invalid pattern '{}': {}",
                        context, idx, pattern, e
                    ))
                })?;
            }
            if let Some(field) = fields.iter().find(|f| !STEP_FIELDS.contains(&f.as_str())) {
                return Err(Error::Config(format!(
                    "{} step {} has unsupported field '{}'",
                    context, idx, field
                )));
            }
        }

        Ok(())
    }
}
