//! Inbound payloads and their decoding.

use crate::error::SyncError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declared payload format of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Decide per message: JSON first, raw text on failure.
    #[default]
    Auto,
    /// Expect JSON; still falls back to raw text when parsing fails.
    Json,
    /// Never parse; forward raw text.
    Text,
}

impl Format {
    /// Returns the attribute spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Auto => "auto",
            Format::Json => "json",
            Format::Text => "text",
        }
    }
}

impl FromStr for Format {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Format::Auto),
            "json" => Ok(Format::Json),
            "text" => Ok(Format::Text),
            other => Err(SyncError::Config(format!("unknown format {other:?}"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed JSON.
    Json(Value),
    /// Raw text.
    Text(String),
}

impl Payload {
    /// Decodes a raw message.
    ///
    /// Parse failures are recovered here by keeping the raw text; the
    /// [`SyncError::Decode`] is only logged.
    pub fn decode(raw: &str, format: Format) -> Self {
        match format {
            Format::Text => Payload::Text(raw.to_owned()),
            Format::Auto | Format::Json => match Self::try_json(raw) {
                Ok(value) => Payload::Json(value),
                Err(err) => {
                    tracing::debug!(error = %err, "payload is not JSON, keeping raw text");
                    Payload::Text(raw.to_owned())
                }
            },
        }
    }

    /// Decodes an HTTP body using its content type.
    ///
    /// `application/json` bodies are parsed unless the target insists on
    /// text; anything else is text unless the target declared JSON.
    pub fn from_http_body(body: String, content_type: Option<&str>, format: Format) -> Self {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);
        match format {
            Format::Text => Payload::Text(body),
            Format::Json => Self::decode(&body, Format::Json),
            Format::Auto if is_json => Self::decode(&body, Format::Json),
            Format::Auto => Payload::Text(body),
        }
    }

    fn try_json(raw: &str) -> Result<Value, SyncError> {
        serde_json::from_str(raw).map_err(|e| SyncError::Decode(e.to_string()))
    }

    /// Returns true for objects and arrays.
    pub fn is_structured(&self) -> bool {
        matches!(self, Payload::Json(Value::Object(_) | Value::Array(_)))
    }

    /// Plain text form of a scalar payload.
    ///
    /// Strings render without quotes; structured values fall back to compact
    /// JSON.
    pub fn to_plain_text(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Json(Value::String(s)) => s.clone(),
            Payload::Json(value) => value.to_string(),
        }
    }

    /// Returns the JSON value, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_prefers_json() {
        assert_eq!(
            Payload::decode(r#"{"v":1}"#, Format::Auto),
            Payload::Json(json!({"v": 1}))
        );
        assert_eq!(Payload::decode("42", Format::Json), Payload::Json(json!(42)));
    }

    #[test]
    fn decode_falls_back_to_text() {
        assert_eq!(
            Payload::decode("tick 12:00", Format::Json),
            Payload::Text("tick 12:00".into())
        );
    }

    #[test]
    fn text_format_never_parses() {
        assert_eq!(
            Payload::decode(r#"{"v":1}"#, Format::Text),
            Payload::Text(r#"{"v":1}"#.into())
        );
    }

    #[test]
    fn http_body_follows_content_type() {
        let body = r#"{"ok":true}"#.to_string();
        assert!(Payload::from_http_body(
            body.clone(),
            Some("application/json; charset=utf-8"),
            Format::Auto
        )
        .is_structured());
        assert_eq!(
            Payload::from_http_body(body.clone(), Some("text/plain"), Format::Auto),
            Payload::Text(body.clone())
        );
        assert!(Payload::from_http_body(body, None, Format::Json).is_structured());
        assert_eq!(
            Payload::from_http_body("{broken".into(), Some("application/json"), Format::Auto),
            Payload::Text("{broken".into())
        );
    }

    #[test]
    fn plain_text_forms() {
        assert_eq!(Payload::Json(json!("hi")).to_plain_text(), "hi");
        assert_eq!(Payload::Json(json!(3.5)).to_plain_text(), "3.5");
        assert_eq!(Payload::Json(json!(null)).to_plain_text(), "null");
        assert!(!Payload::Json(json!(true)).is_structured());
        assert!(Payload::Json(json!([1, 2])).is_structured());
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("".parse::<Format>().unwrap(), Format::Auto);
        assert!("xml".parse::<Format>().is_err());
    }
}
