use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};

/// Tag given to recordings that end up with no tags at all.
pub const UNTAGGED: &str = "Untagged";

/// A finished loopback recording, handed to the host's catalog.
///
/// Only built for sessions whose file exists and whose duration passed the
/// session's minimum threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub uid: String,
    pub name: String,
    pub file: PathBuf,
    pub duration_secs: f64,
    #[serde(deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Local>,
    pub sample_rate: f64,
    pub num_channels: u16,
}

impl Recording {
    /// `rec_<YYYYmmdd>_<HHMMSS>_<8 hex digits>`.
    pub fn generate_uid(at: &DateTime<Local>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("rec_{}_{}", at.format("%Y%m%d_%H%M%S"), &suffix[..8])
    }

    /// `"<prefix> HH:MM:SS"`.
    pub fn default_name(prefix: &str, at: &DateTime<Local>) -> String {
        format!("{} {}", prefix, at.format("%H:%M:%S"))
    }

    /// Split a comma-separated tag list.
    pub fn parse_tags(joined: &str) -> Vec<String> {
        Self::normalize_tags(joined.split(','))
    }

    /// Trim, drop empties and duplicates (first occurrence wins), and fall
    /// back to [`UNTAGGED`] when nothing is left.
    pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if !tag.is_empty() && !out.iter().any(|t| t == tag) {
                out.push(tag.to_string());
            }
        }
        if out.is_empty() {
            out.push(UNTAGGED.to_string());
        }
        out
    }

    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsRepr {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TagsRepr::deserialize(deserializer)? {
        TagsRepr::List(tags) => Recording::normalize_tags(tags),
        TagsRepr::Joined(joined) => Recording::parse_tags(&joined),
    })
}
