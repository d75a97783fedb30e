use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Separators accepted when operators paste variant lists: ASCII and
/// fullwidth commas, semicolons, the enumeration comma and whitespace.
static VARIANT_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,，;；、\s]+").expect("variant separator pattern should compile"));

/// Risk classification carried by a dictionary entry. Informational for
/// matching (every entry is searched the same way) but drives how hits are
/// reported downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::High
    }
}

/// One sensitive keyword plus its variant spellings. The matcher treats the
/// keyword and every variant as equally valid literals; `is_local_only`
/// records provenance (authored here vs. pulled from the shared list) and is
/// never consulted during matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryEntry {
    pub keyword: String,
    pub variants: Vec<String>,
    pub risk_level: RiskLevel,
    pub is_local_only: bool,
}

impl Default for DictionaryEntry {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            variants: Vec::new(),
            risk_level: RiskLevel::default(),
            is_local_only: true,
        }
    }
}

impl DictionaryEntry {
    pub fn new(keyword: impl Into<String>, variants: Vec<String>, risk_level: RiskLevel) -> Self {
        Self {
            keyword: keyword.into(),
            variants,
            risk_level,
            is_local_only: true,
        }
    }

    /// Keyword first, then variants, in stored order. Match candidates are
    /// iterated exactly in this order.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.keyword.as_str()).chain(self.variants.iter().map(String::as_str))
    }
}

/// Splits operator-entered variant text into individual variants, trimming
/// and dropping empties.
pub fn split_variants(raw: &str) -> Vec<String> {
    VARIANT_SEPARATORS
        .split(raw)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Ordered keyword collection with unique keywords. Newest entries sit at
/// the front; the scan iterates entries in this order, which is observable
/// through equal-offset tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct DictionaryStore {
    entries: Vec<DictionaryEntry>,
}

impl DictionaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from existing entries, dropping any whose keyword
    /// duplicates an earlier one.
    pub fn from_entries(entries: Vec<DictionaryEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            if store.contains(&entry.keyword) {
                warn!(keyword = %entry.keyword, "dropping duplicate dictionary entry");
                continue;
            }
            store.entries.push(entry);
        }
        store
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.entries.iter().any(|e| e.keyword == keyword)
    }

    /// Adds a new entry at the front. The keyword is trimmed and must be
    /// non-empty and unique within the store.
    pub fn add(&mut self, mut entry: DictionaryEntry) -> Result<()> {
        entry.keyword = entry.keyword.trim().to_string();
        if entry.keyword.is_empty() {
            bail!("dictionary keyword must not be empty");
        }
        if self.contains(&entry.keyword) {
            bail!("dictionary already contains keyword '{}'", entry.keyword);
        }
        self.entries.insert(0, entry);
        Ok(())
    }

    /// Replaces the entry with the same keyword in place.
    pub fn update(&mut self, entry: DictionaryEntry) -> Result<()> {
        match self.entries.iter_mut().find(|e| e.keyword == entry.keyword) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => bail!("no dictionary entry for keyword '{}'", entry.keyword),
        }
    }

    pub fn remove(&mut self, keyword: &str) -> Result<DictionaryEntry> {
        match self.entries.iter().position(|e| e.keyword == keyword) {
            Some(idx) => Ok(self.entries.remove(idx)),
            None => bail!("no dictionary entry for keyword '{keyword}'"),
        }
    }

    /// Flips the provenance flag, e.g. after an entry is published to the
    /// shared list (`false`) or pulled back to local-only (`true`).
    pub fn set_local_only(&mut self, keyword: &str, local: bool) -> Result<()> {
        match self.entries.iter_mut().find(|e| e.keyword == keyword) {
            Some(entry) => {
                entry.is_local_only = local;
                Ok(())
            }
            None => bail!("no dictionary entry for keyword '{keyword}'"),
        }
    }

    /// Merges entries fetched from the shared list: local entries always
    /// win, cloud entries with unseen keywords are appended and flagged as
    /// not local-only. Returns how many were appended.
    pub fn merge_cloud(&mut self, cloud: Vec<DictionaryEntry>) -> usize {
        let mut added = 0;
        for mut entry in cloud {
            if entry.keyword.trim().is_empty() || self.contains(&entry.keyword) {
                continue;
            }
            entry.is_local_only = false;
            self.entries.push(entry);
            added += 1;
        }
        if added > 0 {
            info!(added, total = self.entries.len(), "merged shared dictionary entries");
        }
        added
    }

    /// Loads the dictionary from a JSON file. A missing file yields an
    /// empty store; a corrupt file is reported and also yields an empty
    /// store so monitoring can still start.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::new(),
        };
        match serde_json::from_str::<Vec<DictionaryEntry>>(&raw) {
            Ok(entries) => Self::from_entries(entries),
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to parse dictionary file, starting empty");
                Self::new()
            }
        }
    }

    /// Writes the dictionary as pretty JSON, holding an exclusive advisory
    /// lock on the file while writing so concurrent processes do not
    /// interleave.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;
        let result = serde_json::to_writer_pretty(&file, &self.entries)
            .with_context(|| format!("failed to write {}", path.display()));
        if let Err(error) = fs2::FileExt::unlock(&file) {
            warn!(%error, "failed to unlock dictionary file");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(keyword: &str, variants: &[&str]) -> DictionaryEntry {
        DictionaryEntry::new(
            keyword,
            variants.iter().map(|v| v.to_string()).collect(),
            RiskLevel::High,
        )
    }

    #[test]
    fn add_prepends_and_rejects_duplicates() {
        let mut store = DictionaryStore::new();
        store.add(entry("私域", &["思域"])).unwrap();
        store.add(entry("微信", &[])).unwrap();
        assert_eq!(store.entries()[0].keyword, "微信");
        assert!(store.add(entry("私域", &[])).is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn add_trims_and_rejects_empty_keyword() {
        let mut store = DictionaryStore::new();
        assert!(store.add(entry("  ", &[])).is_err());
        store.add(entry(" 私域 ", &[])).unwrap();
        assert!(store.contains("私域"));
    }

    #[test]
    fn update_replaces_matching_keyword() {
        let mut store = DictionaryStore::new();
        store.add(entry("私域", &[])).unwrap();
        let mut changed = entry("私域", &["思域", "私欲"]);
        changed.risk_level = RiskLevel::Medium;
        store.update(changed).unwrap();
        assert_eq!(store.entries()[0].variants.len(), 2);
        assert_eq!(store.entries()[0].risk_level, RiskLevel::Medium);
        assert!(store.update(entry("没有", &[])).is_err());
    }

    #[test]
    fn remove_returns_the_entry() {
        let mut store = DictionaryStore::new();
        store.add(entry("私域", &[])).unwrap();
        let removed = store.remove("私域").unwrap();
        assert_eq!(removed.keyword, "私域");
        assert!(store.is_empty());
        assert!(store.remove("私域").is_err());
    }

    #[test]
    fn merge_cloud_keeps_local_entries_and_appends_unseen() {
        let mut store = DictionaryStore::new();
        let mut local = entry("私域", &["思域"]);
        local.risk_level = RiskLevel::Medium;
        store.add(local).unwrap();

        let added = store.merge_cloud(vec![entry("私域", &[]), entry("加微信", &[])]);
        assert_eq!(added, 1);
        assert_eq!(store.len(), 2);
        // Local definition survives untouched.
        assert_eq!(store.entries()[0].risk_level, RiskLevel::Medium);
        assert_eq!(store.entries()[0].variants, vec!["思域".to_string()]);
        // Appended entry is flagged as shared.
        assert!(!store.entries()[1].is_local_only);
    }

    #[test]
    fn set_local_only_flips_provenance() {
        let mut store = DictionaryStore::new();
        store.add(entry("私域", &[])).unwrap();
        store.set_local_only("私域", false).unwrap();
        assert!(!store.entries()[0].is_local_only);
    }

    #[test]
    fn split_variants_handles_mixed_separators() {
        assert_eq!(
            split_variants("思域, 私欲，斯玉; 思雨"),
            vec!["思域", "私欲", "斯玉", "思雨"]
        );
        assert!(split_variants("  ,， ").is_empty());
    }

    #[test]
    fn literals_iterate_keyword_then_variants() {
        let e = entry("私域", &["思域", "私欲"]);
        let literals: Vec<&str> = e.literals().collect();
        assert_eq!(literals, vec!["私域", "思域", "私欲"]);
    }

    #[test]
    fn load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dictionary.json");

        let mut store = DictionaryStore::new();
        store.add(entry("私域", &["思域"])).unwrap();
        store.save(&path).unwrap();

        let loaded = DictionaryStore::load(&path);
        assert_eq!(loaded.entries(), store.entries());
    }

    #[test]
    fn load_missing_or_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DictionaryStore::load(&dir.path().join("none.json")).is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(DictionaryStore::load(&bad).is_empty());
    }

    #[test]
    fn lowercase_risk_levels_on_the_wire() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: RiskLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, RiskLevel::Medium);
    }
}
