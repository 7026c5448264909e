use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::network::CapturedNetworkActivity;

/// An anchor found in the rendered markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub text: String,
    /// Absolute URL, resolved against the page URL.
    pub href: String,
}

/// Result of one capture. Owned entirely by the caller once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub html: String,
    pub links: Vec<Link>,
    pub network_activity: Vec<CapturedNetworkActivity>,
    /// PNG bytes; base64 in serialized form.
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub screenshot: Vec<u8>,
}

impl PageSummary {
    pub fn link_hrefs(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.href.as_str())
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    BASE64_STANDARD
        .decode(text.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_is_base64_in_json() {
        let summary = PageSummary {
            url: "http://h/".into(),
            timestamp: Utc::now(),
            html: "<html></html>".into(),
            links: vec![Link {
                text: "one".into(),
                href: "http://h/one".into(),
            }],
            network_activity: Vec::new(),
            screenshot: vec![0x89, b'P', b'N', b'G'],
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["screenshot"], "iVBORw==");
        assert!(json["networkActivity"].as_array().unwrap().is_empty());

        let back: PageSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back.screenshot, summary.screenshot);
        assert_eq!(back.link_hrefs().collect::<Vec<_>>(), vec!["http://h/one"]);
    }
}
