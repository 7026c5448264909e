use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Browser window size used for every page the engine opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1440x900)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Viewport dimensions must be positive")]
    Zero,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(w.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(h.to_string()))?;

        if width == 0 || height == 0 {
            return Err(ViewportParseError::Zero);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Config files write "1440x900"; JSON output round-trips the object form.
impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Object { width: u32, height: u32 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Object { width, height } => Ok(Viewport { width, height }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions_with_either_separator() {
        let vp: Viewport = "1280x720".parse().unwrap();
        assert_eq!((vp.width, vp.height), (1280, 720));
        let vp: Viewport = " 800 X 600 ".parse().unwrap();
        assert_eq!((vp.width, vp.height), (800, 600));
    }

    #[test]
    fn rejects_malformed_and_zero() {
        assert!("1440".parse::<Viewport>().is_err());
        assert!("1440x900x600".parse::<Viewport>().is_err());
        assert!("abcx900".parse::<Viewport>().is_err());
        assert!(matches!(
            "0x900".parse::<Viewport>(),
            Err(ViewportParseError::Zero)
        ));
    }

    #[test]
    fn deserializes_string_and_object_forms() {
        #[derive(Deserialize)]
        struct Holder {
            viewport: Viewport,
        }

        let from_toml: Holder = toml::from_str("viewport = \"1024x768\"").unwrap();
        assert_eq!(from_toml.viewport.width, 1024);

        let from_json: Holder =
            serde_json::from_str(r#"{"viewport":{"width":10,"height":20}}"#).unwrap();
        assert_eq!(from_json.viewport.height, 20);
    }

    #[test]
    fn display_matches_parse_format() {
        let vp = Viewport {
            width: 1920,
            height: 1080,
        };
        assert_eq!(vp.to_string(), "1920x1080");
        assert_eq!(vp.to_string().parse::<Viewport>().unwrap(), vp);
    }
}
