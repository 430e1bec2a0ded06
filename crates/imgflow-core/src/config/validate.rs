//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

const OUTPUT_FORMATS: &[&str] = &["json", "jsonl"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.transformer.validate()?;

        if let Some(entry) = self.pipeline.iter().find(|op| op.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "pipeline entry with empty op name (params: {:?})",
                entry.params
            )));
        }
        if self.input.part_num == 0 {
            return Err(ConfigError::ValidationError(
                "input.part_num must be > 0".into(),
            ));
        }
        if self.input.part_id >= self.input.part_num {
            return Err(ConfigError::ValidationError(format!(
                "input.part_id must be < part_num ({})",
                self.input.part_num
            )));
        }
        if self.input.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "input.max_file_size_mb must be > 0".into(),
            ));
        }
        if !OUTPUT_FORMATS.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be one of {:?}",
                OUTPUT_FORMATS
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of {:?}",
                LOG_FORMATS
            )));
        }
        Ok(())
    }
}
