use anyhow::{Context, Result};
use serde::Serialize;

/// Output format for structured data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON - machine-parseable
    Json,
}

impl OutputFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Serialize data to pretty JSON.
    pub fn serialize<T: Serialize>(data: &T) -> Result<String> {
        serde_json::to_string_pretty(data).context("JSON serialization failed")
    }

    /// Print `data` as JSON, or run `text` for the human form.
    pub fn emit<T: Serialize>(self, data: &T, text: impl FnOnce(&T)) -> Result<()> {
        match self {
            Self::Json => println!("{}", Self::serialize(data)?),
            Self::Text => text(data),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_format() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
        assert!(OutputFormat::Json.is_json());
    }

    #[test]
    fn serialize_is_pretty() {
        let out = OutputFormat::serialize(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(out, "{\n  \"a\": 1\n}");
    }
}
