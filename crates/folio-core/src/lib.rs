//! Core domain model for the Folio catalog pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "folio-core";

/// Public-safe projection of a hosted repository.
///
/// `name` is the stable identity key across both pipeline stages; enrichment
/// only patches `blurb` and never renames or reorders records. The field
/// names below are the wire contract with the rendering layer, so the struct
/// serializes with camelCase keys and omits `blurb` until enrichment set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub is_private: bool,
}

impl ProjectRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            blurb: None,
            homepage: None,
            url: None,
            updated_at: None,
            visibility: None,
            stars: 0,
            topics: Vec::new(),
            archived: false,
            is_private: false,
        }
    }

    /// Update timestamp for ordering; missing or unparseable values sort as
    /// the unix epoch so never-updated records sink to the bottom.
    pub fn updated_at_or_epoch(&self) -> DateTime<Utc> {
        self.updated_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Stage-1 catalog order: most recently updated first.
pub fn sort_by_recency(records: &mut [ProjectRecord]) {
    records.sort_by_key(|r| std::cmp::Reverse(r.updated_at_or_epoch()));
}

/// Alternate rendering-layer order: public before private, then by name.
pub fn sort_by_access(records: &mut [ProjectRecord]) {
    records.sort_by(|a, b| {
        a.is_private
            .cmp(&b.is_private)
            .then_with(|| a.name.cmp(&b.name))
    });
}
