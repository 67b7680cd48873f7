use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pipeline step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Backup,
    Decompress,
    Parse,
    Mutate,
    Serialize,
    Compress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Backup => "backup",
            Self::Decompress => "decompress",
            Self::Parse => "parse",
            Self::Mutate => "mutate",
            Self::Serialize => "serialize",
            Self::Compress => "compress",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a run. Each successful stage advances to the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    BackupEnsured,
    Decompressed,
    Parsed,
    Mutated,
    Serialized,
    Compressed,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupOutcome {
    Created,
    AlreadyPresent,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked,
    AlreadyUnlocked,
    MissingTraits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketeerEntry {
    pub owner: String,
    pub name: String,
    pub code: String,
    pub outcome: UnlockOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlockReport {
    pub found: usize,
    pub entries: Vec<MarketeerEntry>,
}

impl UnlockReport {
    pub fn count(&self, outcome: UnlockOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn unlocked(&self) -> usize {
        self.count(UnlockOutcome::Unlocked)
    }

    pub fn is_modified(&self) -> bool {
        self.unlocked() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSummary {
    pub path: PathBuf,
    pub backup: BackupOutcome,
    pub compressed_len: u64,
    pub document_len: usize,
    pub written_len: Option<u64>,
    pub final_state: RunState,
    pub report: UnlockReport,
}
