//! Alias map shared by filter and sort compilation of one query.
//!
//! Keys are canonical path keys: the raw path segments from the root
//! collection joined with `.` (`"author"`, `"author.role"`,
//! `"header:image"`). The root collection's own alias, if any, lives under
//! the empty key.
//!
//! An [`AliasMap`] belongs to exactly one in-flight compilation and is
//! passed as `&mut`. Concurrent compilations each need their own map.

use std::collections::{BTreeMap, BTreeSet};

const ALIAS_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub alias: String,
    pub collection: String,
}

/// Deterministic generator of short lowercase aliases.
///
/// Aliases are derived from `blake3(seed || counter)`; the same seed and the
/// same sequence of joins always yields the same SQL text. Every alias
/// issued, or reserved, is remembered so none repeats within a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasGenerator {
    seed: u64,
    next: u64,
    issued: BTreeSet<String>,
}

impl AliasGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            next: 0,
            issued: BTreeSet::new(),
        }
    }

    pub fn generate(&mut self) -> String {
        loop {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&self.seed.to_le_bytes());
            hasher.update(&self.next.to_le_bytes());
            self.next += 1;

            let alias: String = hasher.finalize().as_bytes()[..ALIAS_LEN]
                .iter()
                .map(|b| (b'a' + b % 26) as char)
                .collect();

            if self.issued.insert(alias.clone()) {
                return alias;
            }
        }
    }

    /// Marks a name (typically a table name) as taken.
    pub fn reserve(&mut self, name: &str) {
        self.issued.insert(name.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMap {
    entries: BTreeMap<String, AliasEntry>,
    generator: AliasGenerator,
}

impl Default for AliasMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasMap {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            generator: AliasGenerator::new(seed),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AliasEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: AliasEntry) {
        self.generator.reserve(&entry.alias);
        self.entries.insert(key.into(), entry);
    }

    /// Alias of the root collection, when the root table is aliased.
    pub fn root_alias(&self) -> Option<&str> {
        self.entries.get("").map(|entry| entry.alias.as_str())
    }

    pub fn set_root(&mut self, alias: impl Into<String>, collection: impl Into<String>) {
        self.insert(
            "",
            AliasEntry {
                alias: alias.into(),
                collection: collection.into(),
            },
        );
    }

    pub fn generate_alias(&mut self) -> String {
        self.generator.generate()
    }

    pub fn reserve(&mut self, name: &str) {
        self.generator.reserve(name);
    }

    /// Empty map for a subquery that continues this map's alias sequence.
    /// Hand it back with [`AliasMap::resume`] so later aliases stay unique
    /// across the whole statement.
    pub fn subquery(&self) -> AliasMap {
        AliasMap {
            entries: BTreeMap::new(),
            generator: self.generator.clone(),
        }
    }

    pub fn resume(&mut self, subquery: AliasMap) {
        self.generator = subquery.generator;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AliasEntry)> {
        self.entries.iter()
    }
}

/// Canonical key of `segment` under `parent` (`None` for the root).
pub fn path_key(parent: Option<&str>, segment: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{}.{}", parent, segment),
        _ => segment.to_string(),
    }
}
