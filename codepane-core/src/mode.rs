use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Language mode of an editor buffer.
///
/// The identifiers are shared by convention with the script running inside
/// the embedded runtime, so adding a variant needs a matching change there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Plain,
    Json,
    Xml,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Plain, Mode::Json, Mode::Xml];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Plain => "plain",
            Mode::Json => "json",
            Mode::Xml => "xml",
        }
    }

    /// MIME type the web editor uses to pick its highlighter.
    pub fn mime_type(self) -> &'static str {
        match self {
            Mode::Plain => "text/plain",
            Mode::Json => "application/json",
            Mode::Xml => "application/xml",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "text/plain" => Ok(Mode::Plain),
            "json" | "application/json" => Ok(Mode::Json),
            "xml" | "application/xml" | "text/xml" => Ok(Mode::Xml),
            other => Err(format!("Unknown editor mode '{}'", other)),
        }
    }
}

/// Light or dark appearance of the embedded editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    #[default]
    Dark,
    Light,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_identifiers_and_mime_types() {
        assert_eq!("json".parse::<Mode>(), Ok(Mode::Json));
        assert_eq!("XML".parse::<Mode>(), Ok(Mode::Xml));
        assert_eq!("application/json".parse::<Mode>(), Ok(Mode::Json));
        assert_eq!(" plain ".parse::<Mode>(), Ok(Mode::Plain));
    }

    #[test]
    fn mode_rejects_unknown_identifier() {
        let err = "yaml".parse::<Mode>().unwrap_err();
        assert!(err.contains("yaml"));
    }

    #[test]
    fn mode_display_matches_wire_tag() {
        for mode in Mode::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
        }
    }

    #[test]
    fn appearance_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Appearance::Light).unwrap(), "\"light\"");
        assert_eq!(Appearance::default(), Appearance::Dark);
    }
}
