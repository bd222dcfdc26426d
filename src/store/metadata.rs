//! Store metadata sidecar (`metadata.json`).
//!
//! Holds everything attached to a store that is not a document: spelling
//! frequencies, synonym sets and free-form user key/value pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Word -> frequency
    #[serde(default)]
    pub spellings: BTreeMap<String, u32>,
    /// Term -> synonyms
    #[serde(default)]
    pub synonyms: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub user: BTreeMap<String, String>,
}

/// Counts of entries transferred by `StoreMetadata::copy_into`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataCopy {
    pub spellings: usize,
    pub synonyms: usize,
    pub user: usize,
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.spellings.is_empty() && self.synonyms.is_empty() && self.user.is_empty()
    }

    /// Add `freq` to a word's frequency (saturating).
    pub fn add_spelling(&mut self, word: impl Into<String>, freq: u32) {
        let entry = self.spellings.entry(word.into()).or_insert(0);
        *entry = entry.saturating_add(freq);
    }

    pub fn add_synonym(&mut self, term: impl Into<String>, synonym: impl Into<String>) {
        self.synonyms
            .entry(term.into())
            .or_default()
            .insert(synonym.into());
    }

    pub fn set_user(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user.insert(key.into(), value.into());
    }

    /// Merge this metadata into `dst`.
    ///
    /// Spelling frequencies add up, synonym sets are unioned and user values
    /// replace whatever `dst` held for the same key.
    pub fn copy_into(&self, dst: &mut StoreMetadata) -> MetadataCopy {
        for (word, &freq) in &self.spellings {
            dst.add_spelling(word.clone(), freq);
        }
        for (term, synonyms) in &self.synonyms {
            dst.synonyms
                .entry(term.clone())
                .or_default()
                .extend(synonyms.iter().cloned());
        }
        for (key, value) in &self.user {
            dst.user.insert(key.clone(), value.clone());
        }
        MetadataCopy {
            spellings: self.spellings.len(),
            synonyms: self.synonyms.len(),
            user: self.user.len(),
        }
    }

    /// Load from `path`. A missing file is empty metadata.
    pub fn load(path: &Path) -> Result<Self> {
        match File::open(path) {
            Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
