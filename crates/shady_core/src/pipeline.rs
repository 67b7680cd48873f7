//! The whole unlock run: backup, decompress, parse, mutate, serialize,
//! compress, in that order and each only after the previous one finished.

use std::path::PathBuf;

use tracing::{info, info_span};

use crate::backup;
use crate::cancel::CancelToken;
use crate::container;
use crate::core_api::{
    BackupOutcome, CoreError, Engine, MarketeerEntry, RunState, RunSummary, Stage,
};
use crate::marketeer::UnlockRules;

#[derive(Debug, Clone)]
pub struct UnlockConfig {
    pub path: PathBuf,
    pub cancel: CancelToken,
    pub rules: UnlockRules,
    /// Report what would change without creating a backup or writing.
    pub dry_run: bool,
}

impl UnlockConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cancel: CancelToken::new(),
            rules: UnlockRules::default(),
            dry_run: false,
        }
    }
}

/// Hooks for reporting progress while a run is underway.
pub trait Observer {
    /// Called when the run is about to enter `stage`.
    fn on_stage(&mut self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each stage completes.
    fn on_state(&mut self, state: RunState) {
        let _ = state;
    }

    fn on_backup(&mut self, outcome: BackupOutcome) {
        let _ = outcome;
    }

    fn on_marketeers_found(&mut self, count: usize) {
        let _ = count;
    }

    fn on_entry(&mut self, entry: &MarketeerEntry) {
        let _ = entry;
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {}

pub fn run(config: &UnlockConfig, observer: &mut dyn Observer) -> Result<RunSummary, CoreError> {
    let span = info_span!("unlock", path = %config.path.display(), dry_run = config.dry_run);
    let _guard = span.enter();
    let cancel = &config.cancel;

    let backup = if config.dry_run {
        BackupOutcome::Skipped
    } else {
        observer.on_stage(Stage::Backup);
        backup::ensure_backup(&config.path, cancel)?
    };
    observer.on_backup(backup);
    observer.on_state(RunState::BackupEnsured);

    observer.on_stage(Stage::Decompress);
    let inflated = container::decompress_file(&config.path, cancel)?;
    observer.on_state(RunState::Decompressed);

    observer.on_stage(Stage::Parse);
    cancel.check(Stage::Parse)?;
    let engine = Engine::with_rules(config.rules.clone());
    let mut session = engine.open_bytes(&inflated.data)?;
    let compressed_len = inflated.compressed_len;
    // The tree holds its own copy; the inflated text is not needed past here.
    drop(inflated);
    observer.on_state(RunState::Parsed);

    observer.on_stage(Stage::Mutate);
    cancel.check(Stage::Mutate)?;
    let report = session.unlock_marketeers();
    observer.on_marketeers_found(report.found);
    for entry in &report.entries {
        observer.on_entry(entry);
    }
    observer.on_state(RunState::Mutated);
    info!(found = report.found, unlocked = report.unlocked(), "marketeers processed");

    let mut summary = RunSummary {
        path: config.path.clone(),
        backup,
        compressed_len,
        document_len: session.document_len(),
        written_len: None,
        final_state: RunState::Mutated,
        report,
    };
    if config.dry_run {
        return Ok(summary);
    }

    observer.on_stage(Stage::Serialize);
    cancel.check(Stage::Serialize)?;
    let bytes = session.to_bytes()?;
    observer.on_state(RunState::Serialized);

    observer.on_stage(Stage::Compress);
    let written = container::compress_file(&config.path, &bytes, cancel)?;
    observer.on_state(RunState::Compressed);

    summary.written_len = Some(written);
    summary.final_state = RunState::Done;
    observer.on_state(RunState::Done);
    Ok(summary)
}
