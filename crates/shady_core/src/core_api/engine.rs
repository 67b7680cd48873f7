use std::path::Path;

use crate::cancel::CancelToken;
use crate::container;
use crate::document::{Document, Element};
use crate::marketeer::{self, UnlockRules};

use super::error::CoreError;
use super::types::{Stage, UnlockReport};

#[derive(Debug, Default, Clone)]
pub struct Engine {
    rules: UnlockRules,
}

/// A parsed save held in memory between load and write-back.
#[derive(Debug)]
pub struct Session {
    document: Document,
    rules: UnlockRules,
    compressed_len: Option<u64>,
    document_len: usize,
    modified: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: UnlockRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &UnlockRules {
        &self.rules
    }

    /// Parses already-decompressed XML.
    pub fn open_bytes<B: AsRef<[u8]>>(&self, bytes: B) -> Result<Session, CoreError> {
        let bytes = bytes.as_ref();
        let document = Document::parse(bytes)?;
        Ok(Session {
            document,
            rules: self.rules.clone(),
            compressed_len: None,
            document_len: bytes.len(),
            modified: false,
        })
    }

    /// Decompresses and parses the gzip save at `path`.
    pub fn open_path(&self, path: &Path, cancel: &CancelToken) -> Result<Session, CoreError> {
        let inflated = container::decompress_file(path, cancel)?;
        cancel.check(Stage::Parse)?;
        let mut session = self.open_bytes(&inflated.data)?;
        session.compressed_len = Some(inflated.compressed_len);
        Ok(session)
    }
}

impl Session {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn compressed_len(&self) -> Option<u64> {
        self.compressed_len
    }

    pub fn document_len(&self) -> usize {
        self.document_len
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn marketeers(&self) -> Vec<&Element> {
        marketeer::find_marketeers(&self.document, &self.rules).collect()
    }

    pub fn unlock_marketeers(&mut self) -> UnlockReport {
        let report = marketeer::unlock_marketeers(&mut self.document, &self.rules);
        self.modified |= report.is_modified();
        report
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.document.to_bytes()
    }

    /// Serializes and gzips the document over `path`. Returns bytes written.
    pub fn save(&self, path: &Path, cancel: &CancelToken) -> Result<u64, CoreError> {
        cancel.check(Stage::Serialize)?;
        let bytes = self.to_bytes()?;
        container::compress_file(path, &bytes, cancel)
    }
}
