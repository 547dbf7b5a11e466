//! Channel namespace for the pub/sub hub.
//!
//! # Grammar
//!
//! ```text
//! articles:all
//! articles:critical
//! articles:high
//! alerts:user
//! system
//! articles:category:{slug}
//! articles:vendor:{name}
//! ```
//!
//! Templated segments are 1–64 characters of ASCII alphanumerics, `-`,
//! `_` or `.`, and are normalized to lowercase. Any other string is
//! rejected with a [`ChannelError`].
//!
//! Article categories and vendors are free text, so the server maps them
//! through [`slugify`] before routing: lowercase, every run of other
//! characters becomes one `-`, leading and trailing `-` are dropped and
//! the result is cut to [`MAX_SEGMENT_LEN`]. "Palo Alto Networks" is
//! published on `articles:vendor:palo-alto-networks`.

use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ARTICLES_ALL: &str = "articles:all";
pub const ARTICLES_CRITICAL: &str = "articles:critical";
pub const ARTICLES_HIGH: &str = "articles:high";
pub const ALERTS_USER: &str = "alerts:user";
pub const SYSTEM: &str = "system";

pub const CATEGORY_PREFIX: &str = "articles:category:";
pub const VENDOR_PREFIX: &str = "articles:vendor:";

/// Maximum length of a templated segment (category slug or vendor name).
pub const MAX_SEGMENT_LEN: usize = 64;

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    ArticlesAll,
    ArticlesCritical,
    ArticlesHigh,
    /// Per-user alert stream. Delivery is always scoped to the owning user.
    AlertsUser,
    System,
    Category(CompactString),
    Vendor(CompactString),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("unknown channel: {0}")]
    Unknown(String),
    #[error("empty segment in channel {0}")]
    EmptySegment(String),
    #[error("segment longer than {MAX_SEGMENT_LEN} characters in channel {0}")]
    SegmentTooLong(String),
    #[error("invalid character {ch:?} in channel {channel}")]
    InvalidCharacter { channel: String, ch: char },
}

impl Channel {
    /// Parse and validate a channel name.
    pub fn parse(name: &str) -> Result<Self, ChannelError> {
        match name {
            ARTICLES_ALL => return Ok(Channel::ArticlesAll),
            ARTICLES_CRITICAL => return Ok(Channel::ArticlesCritical),
            ARTICLES_HIGH => return Ok(Channel::ArticlesHigh),
            ALERTS_USER => return Ok(Channel::AlertsUser),
            SYSTEM => return Ok(Channel::System),
            _ => {}
        }

        if let Some(slug) = name.strip_prefix(CATEGORY_PREFIX) {
            return validate_segment(name, slug).map(Channel::Category);
        }
        if let Some(vendor) = name.strip_prefix(VENDOR_PREFIX) {
            return validate_segment(name, vendor).map(Channel::Vendor);
        }

        Err(ChannelError::Unknown(name.to_owned()))
    }

    /// Build an `articles:category:{slug}` channel.
    pub fn category(slug: &str) -> Result<Self, ChannelError> {
        Self::parse(&format!("{CATEGORY_PREFIX}{slug}"))
    }

    /// Build an `articles:vendor:{name}` channel.
    pub fn vendor(name: &str) -> Result<Self, ChannelError> {
        Self::parse(&format!("{VENDOR_PREFIX}{name}"))
    }

    /// Channels whose audience is a single user rather than every subscriber.
    pub fn is_user_scoped(&self) -> bool {
        matches!(self, Channel::AlertsUser)
    }
}

/// Map a free-text category or vendor name onto the segment grammar.
///
/// May return an empty string, which no channel accepts.
pub fn slugify(value: &str) -> CompactString {
    let mut slug = CompactString::default();
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.') {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SEGMENT_LEN {
            break;
        }
    }
    slug.truncate(MAX_SEGMENT_LEN);
    let trimmed = slug.trim_end_matches('-').len();
    slug.truncate(trimmed);
    slug
}

fn validate_segment(channel: &str, segment: &str) -> Result<CompactString, ChannelError> {
    if segment.is_empty() {
        return Err(ChannelError::EmptySegment(channel.to_owned()));
    }
    if segment.chars().count() > MAX_SEGMENT_LEN {
        return Err(ChannelError::SegmentTooLong(channel.to_owned()));
    }
    if let Some(ch) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ChannelError::InvalidCharacter {
            channel: channel.to_owned(),
            ch,
        });
    }
    Ok(CompactString::from(segment.to_ascii_lowercase()))
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::ArticlesAll => f.write_str(ARTICLES_ALL),
            Channel::ArticlesCritical => f.write_str(ARTICLES_CRITICAL),
            Channel::ArticlesHigh => f.write_str(ARTICLES_HIGH),
            Channel::AlertsUser => f.write_str(ALERTS_USER),
            Channel::System => f.write_str(SYSTEM),
            Channel::Category(slug) => write!(f, "{CATEGORY_PREFIX}{slug}"),
            Channel::Vendor(name) => write!(f, "{VENDOR_PREFIX}{name}"),
        }
    }
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::parse(s)
    }
}

impl Serialize for Channel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Channel::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_literals() {
        assert_eq!(Channel::parse("articles:all"), Ok(Channel::ArticlesAll));
        assert_eq!(Channel::parse("articles:critical"), Ok(Channel::ArticlesCritical));
        assert_eq!(Channel::parse("articles:high"), Ok(Channel::ArticlesHigh));
        assert_eq!(Channel::parse("alerts:user"), Ok(Channel::AlertsUser));
        assert_eq!(Channel::parse("system"), Ok(Channel::System));
    }

    #[test]
    fn test_templated_channels_are_normalized() {
        let channel = Channel::parse("articles:vendor:Microsoft").unwrap();
        assert_eq!(channel, Channel::Vendor("microsoft".into()));
        assert_eq!(channel.to_string(), "articles:vendor:microsoft");

        let channel = Channel::category("ransomware").unwrap();
        assert_eq!(channel.to_string(), "articles:category:ransomware");
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(matches!(
            Channel::parse("articles:medium"),
            Err(ChannelError::Unknown(_))
        ));
        assert!(matches!(Channel::parse(""), Err(ChannelError::Unknown(_))));
        assert!(matches!(
            Channel::parse("articles:category:"),
            Err(ChannelError::EmptySegment(_))
        ));
        assert!(matches!(
            Channel::parse("articles:vendor:cisco systems"),
            Err(ChannelError::InvalidCharacter { ch: ' ', .. })
        ));
        assert!(matches!(
            Channel::parse("articles:category:a:b"),
            Err(ChannelError::InvalidCharacter { ch: ':', .. })
        ));
        let long = format!("articles:vendor:{}", "x".repeat(MAX_SEGMENT_LEN + 1));
        assert!(matches!(
            Channel::parse(&long),
            Err(ChannelError::SegmentTooLong(_))
        ));
    }

    #[test]
    fn test_slugify_free_text() {
        assert_eq!(slugify("Palo Alto Networks"), "palo-alto-networks");
        assert_eq!(slugify("  Zero   Day "), "zero-day");
        assert_eq!(slugify("AT&T"), "at-t");
        assert_eq!(slugify("--Node.js--"), "node.js");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(&"a".repeat(100)).len(), MAX_SEGMENT_LEN);

        let channel = Channel::vendor(&slugify("Cisco Systems")).unwrap();
        assert_eq!(channel.to_string(), "articles:vendor:cisco-systems");
        assert!(Channel::category(&slugify("!!!")).is_err());
    }

    #[test]
    fn test_only_alerts_user_is_user_scoped() {
        assert!(Channel::AlertsUser.is_user_scoped());
        assert!(!Channel::ArticlesAll.is_user_scoped());
        assert!(!Channel::System.is_user_scoped());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&Channel::Category("malware".into())).unwrap();
        assert_eq!(json, "\"articles:category:malware\"");
        let parsed: Channel = serde_json::from_str("\"articles:high\"").unwrap();
        assert_eq!(parsed, Channel::ArticlesHigh);
        assert!(serde_json::from_str::<Channel>("\"nope\"").is_err());
    }
}
