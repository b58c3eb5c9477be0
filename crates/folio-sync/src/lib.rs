//! Two-stage catalog pipeline: repository harvest and README enrichment.
//!
//! Stage 1 resolves the authenticated identity, lists repositories through a
//! [`RepositoryDirectory`], and overwrites the catalog wholesale. Stage 2
//! re-reads the catalog and, per record in order, derives owner/repo from the
//! canonical url, fetches the README through a [`ReadmeSource`], strips its
//! markup, and attaches a bounded blurb. Per-record failures degrade to "record
//! unchanged"; only identity resolution, listing, and catalog I/O are fatal.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use folio_adapters::{parse_owner_repo, GitHubConfig, ReadmeSource, RepositoryDirectory};
use folio_core::ProjectRecord;
use folio_storage::CatalogStore;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "folio-sync";

/// Upper bound on blurb length, excluding the ellipsis marker.
pub const DEFAULT_BLURB_CHARS: usize = 320;

/// Summaries never need more source text than this.
const WORK_CAP_CHARS: usize = 2000;

/// A sentence boundary is only useful once the summary has some substance.
const SENTENCE_MIN_CHARS: usize = 120;

/// Converts raw README markup into single-line plain prose.
///
/// Pass order matters: later passes assume earlier removals. Unterminated
/// fences and unbalanced brackets simply fail to match and pass through as
/// literal text; every pattern is non-greedy and bounded by the document.
#[derive(Debug)]
pub struct MarkupStripper {
    fences: Regex,
    images: Regex,
    links: Regex,
    badges: Regex,
    html_tags: Regex,
    headings: Regex,
    markers: Regex,
    newlines: Regex,
    spaces: Regex,
}

impl MarkupStripper {
    pub fn new() -> Self {
        Self {
            fences: pattern(r"(?s)```.*?```"),
            images: pattern(r"!\[[^\]]*\]\([^)]*\)"),
            links: pattern(r"\[([^\]]+)\]\([^)]*\)"),
            badges: pattern(r"(?m)^\s*\[!\[(?s:.*?)\)\s*\]\([^)]*\).*$"),
            html_tags: pattern(r"<[^>]+>"),
            headings: pattern(r"(?m)^#+\s*"),
            markers: pattern(r"[*_`~>#]"),
            newlines: pattern(r"\r?\n"),
            spaces: pattern(r"\s{2,}"),
        }
    }

    pub fn strip(&self, markup: &str) -> String {
        if markup.is_empty() {
            return String::new();
        }
        let text = self.fences.replace_all(markup, " ");
        let text = self.images.replace_all(&text, " ");
        let text = self.links.replace_all(&text, "$1");
        let text = self.badges.replace_all(&text, " ");
        let text = self.html_tags.replace_all(&text, " ");
        let text = self.headings.replace_all(&text, "");
        let text = self.markers.replace_all(&text, "");
        let text = self.newlines.replace_all(&text, " ");
        let text = self.spaces.replace_all(&text, " ");
        text.trim().to_string()
    }
}

impl Default for MarkupStripper {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static stripper pattern")
}

/// Truncate stripped prose to a bounded blurb.
///
/// Works on the first [`WORK_CAP_CHARS`] characters only. Prefers the first
/// `". "` sentence boundary at or past character [`SENTENCE_MIN_CHARS`];
/// otherwise takes the whole capped text. A candidate longer than `max_chars`
/// is cut there, backed off to the last space so no word is split, and marked
/// with an ellipsis. All indexing is by character, so multi-byte input never
/// splits a scalar value.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let capped = match text.char_indices().nth(WORK_CAP_CHARS) {
        Some((byte, _)) => &text[..byte],
        None => text,
    };

    let sentence_end = capped
        .char_indices()
        .nth(SENTENCE_MIN_CHARS)
        .map(|(byte, _)| byte)
        .and_then(|from| capped[from..].find(". ").map(|found| from + found));

    let candidate = match sentence_end {
        Some(period) => &capped[..=period],
        None => capped,
    };

    match candidate.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let head = &candidate[..cut];
            let head = match head.rfind(' ') {
                Some(space) if space > 0 => &head[..space],
                _ => head,
            };
            let mut blurb = head.trim().to_string();
            blurb.push('…');
            blurb
        }
        None => candidate.trim().to_string(),
    }
}

/// Pure enrichment pass: map every record, in order, to a copy with `blurb`
/// attached when its README could be located and summarized. Soft failures
/// (unparseable url, missing or undecodable README) leave the record exactly
/// as loaded, including any blurb from an earlier run.
pub async fn enrich_records(
    records: Vec<ProjectRecord>,
    readmes: &dyn ReadmeSource,
    stripper: &MarkupStripper,
) -> Vec<ProjectRecord> {
    let mut enriched = Vec::with_capacity(records.len());
    for mut record in records {
        match record.url.as_deref().and_then(parse_owner_repo) {
            Some(target) => {
                let raw = readmes.readme_text(&target.owner, &target.repo).await;
                if raw.is_empty() {
                    debug!(name = %record.name, "no readme; record unchanged");
                } else {
                    let prose = stripper.strip(&raw);
                    record.blurb = Some(summarize(&prose, DEFAULT_BLURB_CHARS));
                }
            }
            None => debug!(name = %record.name, "record url not parseable; record unchanged"),
        }
        enriched.push(record);
    }
    enriched
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub catalog_path: PathBuf,
    pub fetch_limit: usize,
    pub api_base: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            catalog_path: std::env::var("FOLIO_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("assets/data/projects.json")),
            fetch_limit: std::env::var("FOLIO_FETCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            user_agent: std::env::var("FOLIO_USER_AGENT")
                .unwrap_or_else(|_| "folio-pipeline/0.1".to_string()),
            http_timeout_secs: std::env::var("FOLIO_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }

    pub fn github(&self) -> GitHubConfig {
        GitHubConfig {
            api_base: self.api_base.clone(),
            token: self.token.clone(),
            user_agent: self.user_agent.clone(),
            timeout: std::time::Duration::from_secs(self.http_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub login: String,
    pub records: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub catalog_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichReport {
    pub run_id: Uuid,
    pub enriched: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub catalog_path: String,
}

/// Stage 1: harvest repository metadata into a fresh catalog document.
pub async fn run_harvest(
    directory: &dyn RepositoryDirectory,
    store: &CatalogStore,
    limit: usize,
) -> Result<HarvestReport> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let login = directory
        .viewer_login()
        .await
        .context("resolving authenticated identity")?;
    info!(%run_id, login, limit, "harvest started");

    let mut records = directory
        .list_repositories(limit)
        .await
        .with_context(|| format!("listing repositories for {login}"))?;
    folio_core::sort_by_recency(&mut records);
    store.save(&records).await?;

    let finished_at = Utc::now();
    info!(%run_id, records = records.len(), "harvest finished");
    Ok(HarvestReport {
        run_id,
        login,
        records: records.len(),
        started_at,
        finished_at,
        catalog_path: store.path().display().to_string(),
    })
}

/// Stage 2: patch blurbs onto an existing catalog, record order preserved.
pub async fn run_enrich(readmes: &dyn ReadmeSource, store: &CatalogStore) -> Result<EnrichReport> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let records = store.load().await?;
    let total = records.len();
    info!(%run_id, total, "enrichment started");

    let stripper = MarkupStripper::new();
    let enriched = enrich_records(records, readmes, &stripper).await;
    let with_blurbs = enriched.iter().filter(|r| r.blurb.is_some()).count();
    store.save(&enriched).await?;

    let finished_at = Utc::now();
    info!(%run_id, enriched = with_blurbs, total, "enrichment finished");
    Ok(EnrichReport {
        run_id,
        enriched: with_blurbs,
        total,
        started_at,
        finished_at,
        catalog_path: store.path().display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_adapters::{AuthError, FetchError};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FakeReadmes {
        by_repo: HashMap<(String, String), String>,
    }

    impl FakeReadmes {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                by_repo: entries
                    .iter()
                    .map(|(owner, repo, text)| {
                        ((owner.to_string(), repo.to_string()), text.to_string())
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ReadmeSource for FakeReadmes {
        async fn readme_text(&self, owner: &str, repo: &str) -> String {
            self.by_repo
                .get(&(owner.to_string(), repo.to_string()))
                .cloned()
                .unwrap_or_default()
        }
    }

    struct FakeDirectory {
        login: String,
        repos: Vec<ProjectRecord>,
    }

    #[async_trait]
    impl RepositoryDirectory for FakeDirectory {
        async fn viewer_login(&self) -> Result<String, AuthError> {
            Ok(self.login.clone())
        }

        async fn list_repositories(&self, limit: usize) -> Result<Vec<ProjectRecord>, FetchError> {
            Ok(self.repos.iter().take(limit).cloned().collect())
        }
    }

    fn record(name: &str, url: Option<&str>) -> ProjectRecord {
        ProjectRecord {
            url: url.map(str::to_string),
            ..ProjectRecord::named(name)
        }
    }

    const SPEC_EXAMPLE: &str = "# Title\n\nThis is **bold** text. More filler text here that continues on beyond one hundred twenty characters easily with padding padding padding padding padding. Second sentence.";

    #[test]
    fn strip_of_empty_input_is_empty() {
        assert_eq!(MarkupStripper::new().strip(""), "");
    }

    #[test]
    fn strip_of_plain_prose_only_collapses_whitespace() {
        let stripper = MarkupStripper::new();
        assert_eq!(
            stripper.strip("plain prose,  nothing\nfancy here."),
            "plain prose, nothing fancy here."
        );
    }

    #[test]
    fn strip_removes_code_fences_without_joining_words() {
        let stripper = MarkupStripper::new();
        let out = stripper.strip("before\n```rust\nfn main() {}\n```\nafter");
        assert_eq!(out, "before after");
    }

    #[test]
    fn strip_keeps_link_text_and_drops_images() {
        let stripper = MarkupStripper::new();
        let out = stripper.strip("See [the docs](https://example.com) ![logo](logo.png) now.");
        assert_eq!(out, "See the docs now.");
    }

    #[test]
    fn strip_drops_badge_lines() {
        let stripper = MarkupStripper::new();
        let out = stripper
            .strip("[![Build](https://img.shields.io/x.svg)](https://ci.example.com)\nReal prose.");
        assert_eq!(out, "Real prose.");
    }

    #[test]
    fn strip_removes_html_tags_and_heading_markers() {
        let stripper = MarkupStripper::new();
        let out = stripper.strip("## Heading\n<p>Some <b>html</b> text</p>");
        assert_eq!(out, "Heading Some html text");
        assert!(!out.contains('<'));
        assert!(!out.contains('#'));
    }

    #[test]
    fn strip_removes_emphasis_without_separating_words() {
        let stripper = MarkupStripper::new();
        assert_eq!(stripper.strip("a**bold**c and _em_ and ~~gone~~"), "aboldc and em and gone");
    }

    #[test]
    fn unterminated_fence_degrades_to_literal_text() {
        let stripper = MarkupStripper::new();
        let out = stripper.strip("intro\n```rust\nlet x = 1;");
        // The fence never closes, so its body survives; the delimiter
        // backticks themselves are eaten by the marker pass.
        assert_eq!(out, "intro rust let x = 1;");
        assert!(!out.contains('`'));
    }

    #[test]
    fn spec_example_strips_to_single_line_prose() {
        let out = MarkupStripper::new().strip(SPEC_EXAMPLE);
        assert!(out.starts_with("Title This is bold text."));
        assert!(!out.contains('#'));
        assert!(!out.contains('*'));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn spec_example_summarizes_at_the_sentence_boundary() {
        let prose = MarkupStripper::new().strip(SPEC_EXAMPLE);
        let blurb = summarize(&prose, DEFAULT_BLURB_CHARS);
        assert!(blurb.ends_with("padding padding padding padding padding."));
        assert!(!blurb.contains("Second sentence"));
    }

    #[test]
    fn summarize_is_identity_for_short_input() {
        assert_eq!(summarize("A short readme blurb.", 320), "A short readme blurb.");
        assert_eq!(summarize("", 320), "");
    }

    #[test]
    fn summarize_respects_the_length_bound() {
        let long = "word ".repeat(500);
        let blurb = summarize(&long, 320);
        assert!(blurb.chars().count() <= 321, "len {}", blurb.chars().count());
        assert!(blurb.ends_with('…'));
    }

    #[test]
    fn summarize_never_splits_a_word() {
        let long = "supercalifragilistic ".repeat(100);
        let blurb = summarize(&long, 320);
        let body = blurb.trim_end_matches('…').trim_end();
        assert!(body.ends_with("supercalifragilistic"), "split word in {body:?}");
    }

    #[test]
    fn summarize_is_char_boundary_safe_for_multibyte_text() {
        let long = "é".repeat(400);
        let blurb = summarize(&long, 320);
        assert!(blurb.chars().count() <= 321);
        assert!(blurb.ends_with('…'));
    }

    #[test]
    fn summarize_ignores_sentence_breaks_before_the_minimum_offset() {
        // The only ". " sits well before character 120, so the whole text is
        // the candidate and fits under the cap untouched.
        let text = "First. And then some trailing words";
        assert_eq!(summarize(text, 320), text);
    }

    #[tokio::test]
    async fn enrichment_attaches_blurbs_and_preserves_order() {
        let readmes = FakeReadmes::new(&[
            ("alice", "widgets", "# Widgets\n\nMakes widgets quickly."),
            ("alice", "gears", "Turns gears."),
        ]);
        let records = vec![
            record("widgets", Some("https://github.com/alice/widgets")),
            record("no-url", None),
            record("gears", Some("https://github.com/alice/gears")),
        ];

        let out = enrich_records(records, &readmes, &MarkupStripper::new()).await;
        let names: Vec<_> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["widgets", "no-url", "gears"]);
        assert_eq!(out[0].blurb.as_deref(), Some("Widgets Makes widgets quickly."));
        assert!(out[1].blurb.is_none());
        assert_eq!(out[2].blurb.as_deref(), Some("Turns gears."));
    }

    #[tokio::test]
    async fn unparseable_urls_leave_the_catalog_unchanged() {
        let readmes = FakeReadmes::new(&[]);
        let records = vec![
            record("a", Some("not a url")),
            record("b", Some("https://github.com/only-owner")),
            record("c", None),
        ];
        let out = enrich_records(records.clone(), &readmes, &MarkupStripper::new()).await;
        assert_eq!(out, records);
    }

    #[tokio::test]
    async fn soft_failure_preserves_existing_blurb() {
        // README source knows nothing, so the second pass must keep the
        // blurb attached by an earlier run.
        let readmes = FakeReadmes::new(&[]);
        let mut already = record("widgets", Some("https://github.com/alice/widgets"));
        already.blurb = Some("Blurb from an earlier run.".to_string());

        let out = enrich_records(vec![already.clone()], &readmes, &MarkupStripper::new()).await;
        assert_eq!(out[0], already);
    }

    #[tokio::test]
    async fn successful_refetch_recomputes_the_blurb() {
        let readmes = FakeReadmes::new(&[("alice", "widgets", "Fresh readme text.")]);
        let mut already = record("widgets", Some("https://github.com/alice/widgets"));
        already.blurb = Some("Stale blurb.".to_string());

        let out = enrich_records(vec![already], &readmes, &MarkupStripper::new()).await;
        assert_eq!(out[0].blurb.as_deref(), Some("Fresh readme text."));
    }

    #[tokio::test]
    async fn harvest_writes_a_sorted_catalog_and_reports_counts() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("projects.json"));
        let directory = FakeDirectory {
            login: "alice".to_string(),
            repos: vec![
                {
                    let mut r = record("old", None);
                    r.updated_at = Some("2020-01-01T00:00:00Z".to_string());
                    r
                },
                {
                    let mut r = record("new", None);
                    r.updated_at = Some("2026-02-24T12:00:00Z".to_string());
                    r
                },
            ],
        };

        let report = run_harvest(&directory, &store, 200).await.expect("harvest");
        assert_eq!(report.login, "alice");
        assert_eq!(report.records, 2);

        let catalog = store.load().await.expect("load");
        let names: Vec<_> = catalog.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["new", "old"]);
    }

    #[tokio::test]
    async fn harvest_respects_the_fetch_limit() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("projects.json"));
        let directory = FakeDirectory {
            login: "alice".to_string(),
            repos: (0..5).map(|i| record(&format!("repo-{i}"), None)).collect(),
        };

        let report = run_harvest(&directory, &store, 3).await.expect("harvest");
        assert_eq!(report.records, 3);
    }

    #[tokio::test]
    async fn enrich_stage_round_trips_through_the_store() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("projects.json"));
        store
            .save(&[
                record("widgets", Some("https://github.com/alice/widgets")),
                record("mystery", Some("https://github.com/alice/mystery")),
            ])
            .await
            .expect("seed catalog");

        let readmes = FakeReadmes::new(&[("alice", "widgets", "Makes widgets.")]);
        let report = run_enrich(&readmes, &store).await.expect("enrich");
        assert_eq!(report.total, 2);
        assert_eq!(report.enriched, 1);

        let catalog = store.load().await.expect("load");
        assert_eq!(catalog[0].blurb.as_deref(), Some("Makes widgets."));
        assert!(catalog[1].blurb.is_none());
    }

    #[tokio::test]
    async fn enrich_stage_fails_without_a_catalog() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("absent.json"));
        let readmes = FakeReadmes::new(&[]);
        assert!(run_enrich(&readmes, &store).await.is_err());
    }
}
