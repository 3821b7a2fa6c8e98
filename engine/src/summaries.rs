//! Saved research summaries
//!
//! Each saved run becomes one markdown file under `<data_dir>/summaries`, with
//! a small front matter block carrying the query and date. Files are named
//! after a slug of the query plus the Unix time of the save.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::conductor::Summary;

const MAX_SLUG_CHARS: usize = 50;
const FRONT_MATTER_FENCE: &str = "---";

/// A summary file read back from disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedSummary {
    pub name: String,
    pub path: PathBuf,
    pub query: Option<String>,
    pub date: Option<String>,
    /// Every front matter field, including query and date
    pub metadata: BTreeMap<String, String>,
    /// Markdown after the front matter
    pub body: String,
}

/// Directory of saved summaries
#[derive(Debug, Clone)]
pub struct SummaryArchive {
    dir: PathBuf,
}

impl SummaryArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `summary` as markdown and return the new file's path
    pub fn save(&self, summary: &Summary) -> Result<PathBuf> {
        self.save_at(summary, Utc::now())
    }

    fn save_at(&self, summary: &Summary, at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create summaries directory {}", self.dir.display())
        })?;

        let stem = format!("{}_{}", slugify(&summary.query)?, at.timestamp());
        let mut path = self.dir.join(format!("{}.md", stem));
        let mut suffix = 2;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.md", stem, suffix));
            suffix += 1;
        }

        fs::write(&path, render_markdown(summary, at))
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Saved summary to {}", path.display());
        Ok(path)
    }

    /// Every saved summary, newest first
    pub fn list(&self) -> Result<Vec<SavedSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            files.push((modified, path));
        }
        files.sort_by(|a, b| b.cmp(a));

        let summaries = files
            .into_iter()
            .map(|(_, path)| read_summary(&path))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = summaries.len(), "Listed saved summaries");
        Ok(summaries)
    }

    /// Read one summary by file name, with or without `.md`, or by path
    pub fn load(&self, name: &str) -> Result<SavedSummary> {
        let given = Path::new(name);
        let path = if given.components().count() > 1 {
            given.to_path_buf()
        } else if given.extension().is_some() {
            self.dir.join(given)
        } else {
            self.dir.join(format!("{}.md", name))
        };

        if !path.is_file() {
            bail!("Summary not found: {}", path.display());
        }
        read_summary(&path)
    }
}

fn read_summary(path: &Path) -> Result<SavedSummary> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read summary {}", path.display()))?;
    let (metadata, body) = split_front_matter(&content);

    Ok(SavedSummary {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        query: metadata.get("query").cloned(),
        date: metadata.get("date").cloned(),
        body: body.trim().to_string(),
        metadata,
    })
}

/// Lowercase word characters joined by underscores, at most 50 chars
fn slugify(query: &str) -> Result<String> {
    let punctuation = Regex::new(r"[^\w\s-]")?;
    let separators = Regex::new(r"[\s_-]+")?;

    let lowered = query.to_lowercase();
    let cleaned = punctuation.replace_all(&lowered, "");
    let joined = separators.replace_all(cleaned.trim(), "_");
    let slug: String = joined.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_matches('_');

    Ok(if slug.is_empty() {
        "summary".to_string()
    } else {
        slug.to_string()
    })
}

fn render_markdown(summary: &Summary, at: DateTime<Utc>) -> String {
    // JSON string literals are valid double-quoted front matter values
    let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s));
    let date = Local.from_utc_datetime(&at.naive_utc()).format("%Y-%m-%d %H:%M:%S");

    let mut out = format!(
        "{fence}\ntitle: Research Summary\nquery: {query}\ndate: {date}\nplan_id: {plan}\ndegraded: {degraded}\n{fence}\n\n{text}\n",
        fence = FRONT_MATTER_FENCE,
        query = quote(&summary.query),
        date = date,
        plan = summary.plan_id,
        degraded = summary.degraded,
        text = summary.text.trim(),
    );

    if !summary.citations.is_empty() {
        out.push_str("\n## Sources\n\n");
        for citation in &summary.citations {
            match &citation.source {
                Some(source) => out.push_str(&format!(
                    "- [{}] {}: {}\n",
                    citation.number, citation.action, source
                )),
                None => out.push_str(&format!("- [{}] {}\n", citation.number, citation.action)),
            }
        }
    }
    out
}

/// Split `---` delimited front matter from the markdown body
fn split_front_matter(content: &str) -> (BTreeMap<String, String>, &str) {
    let mut metadata = BTreeMap::new();
    let Some(rest) = content.strip_prefix(FRONT_MATTER_FENCE) else {
        return (metadata, content);
    };
    let Some((front, body)) = rest.split_once(&format!("\n{}", FRONT_MATTER_FENCE)) else {
        return (metadata, content);
    };

    for line in front.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let value = if value.starts_with('"') {
            serde_json::from_str::<String>(value).unwrap_or_else(|_| value.trim_matches('"').to_string())
        } else {
            value.to_string()
        };
        metadata.insert(key.trim().to_string(), value);
    }
    (metadata, body)
}
