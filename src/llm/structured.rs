use crate::llm::types::LlmError;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Instruction appended to the system prompt for JSON output
pub const JSON_INSTRUCTION: &str = "Respond only with a single valid JSON value. \
Do not wrap it in markdown and do not add any text before or after it.";

/// Structured output formats the client can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            OutputFormat::Json => JSON_INSTRUCTION,
        }
    }

    /// Decode raw model output into a JSON value.
    pub fn decode(&self, raw: &str) -> Result<Value, LlmError> {
        match self {
            OutputFormat::Json => {
                let candidate = extract_json(raw);
                serde_json::from_str(candidate).map_err(|e| LlmError::MalformedOutput {
                    format: self.as_str().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = LlmError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            _ => Err(LlmError::UnsupportedFormat(name.to_string())),
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)\n?\s*```").ok())
        .as_ref()
}

/// Strip a markdown code fence around the payload, if there is one.
///
/// Models frequently wrap JSON in ```json fences even when told not to. Text
/// without a fence is returned trimmed and otherwise untouched.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
    {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(LlmError::UnsupportedFormat(name)) if name == "yaml"
        ));
    }

    #[test]
    fn test_extract_json_strips_fences() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"ok\": true}\n```\nAnything else?"),
            "{\"ok\": true}"
        );
        assert_eq!(extract_json("  {\"plain\": true} "), "{\"plain\": true}");
    }

    #[test]
    fn test_decode() {
        let value = OutputFormat::Json
            .decode("```json\n{\"name\": \"Test\", \"value\": 123}\n```")
            .unwrap();
        assert_eq!(value, json!({"name": "Test", "value": 123}));

        let err = OutputFormat::Json.decode("I cannot answer that.").unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { format, .. } if format == "json"));
    }
}
