use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

impl KilnConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "project".to_string(),
                hint: "Name the project to build, or pass --project <NAME>".to_string(),
            }
            .into());
        }

        if self.browser.is_none() {
            return Err(ConfigError::MissingField {
                field: "browser".to_string(),
                hint: "Set 'browser' to the application entry point, e.g. \"src/main.ts\""
                    .to_string(),
            }
            .into());
        }

        if self.poll == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "poll".to_string(),
                value: "0".to_string(),
                hint: "Use a polling interval of at least 1 millisecond".to_string(),
            }
            .into());
        }

        if let Some(pattern) = self.watch_ignore.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "watchIgnore".to_string(),
                value: format!("{:?}", pattern),
                hint: "Remove empty patterns; they would ignore every change".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Settings that are valid but probably not what the user meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.ssr && self.server.is_none() {
            warnings.push(
                "'ssr' is enabled but no 'server' entry is configured; server files will not be written"
                    .to_string(),
            );
        }

        if self.poll.is_some() && !self.watch {
            warnings.push("'poll' has no effect without watch mode".to_string());
        }

        warnings
    }
}
