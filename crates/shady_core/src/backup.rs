use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::core_api::{BackupOutcome, CoreError, Stage};

pub const BACKUP_SUFFIX: &str = ".bak";

const COPY_CHUNK: usize = 64 * 1024;

/// `save.xml.gz` -> `save.xml.gz.bak`, next to the original.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Makes sure a pristine copy of `path` exists before anything touches it.
///
/// An existing backup is never replaced. The source is opened before the
/// backup file is created, so a missing input leaves no `.bak` behind. A copy
/// that fails or is cancelled part way removes its partial output: a
/// truncated backup would otherwise shadow the real one forever.
pub fn ensure_backup(path: &Path, cancel: &CancelToken) -> Result<BackupOutcome, CoreError> {
    cancel.check(Stage::Backup)?;

    let source = File::open(path)
        .map_err(|e| CoreError::io(Stage::Backup, format!("{}: {e}", path.display())))?;

    let target = backup_path(path);
    let dest = match OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!(backup = %target.display(), "backup already present");
            return Ok(BackupOutcome::AlreadyPresent);
        }
        Err(e) => {
            return Err(CoreError::io(
                Stage::Backup,
                format!("{}: {e}", target.display()),
            ));
        }
    };

    match copy_chunked(BufReader::new(source), BufWriter::new(dest), cancel) {
        Ok(copied) => {
            info!(backup = %target.display(), bytes = copied, "backup created");
            Ok(BackupOutcome::Created)
        }
        Err(err) => {
            let _ = fs::remove_file(&target);
            Err(err)
        }
    }
}

fn copy_chunked<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    cancel: &CancelToken,
) -> Result<u64, CoreError> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        cancel.check(Stage::Backup)?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::io(Stage::Backup, format!("reading source: {e}"))),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| CoreError::io(Stage::Backup, format!("writing backup: {e}")))?;
        copied += n as u64;
    }
    writer
        .flush()
        .map_err(|e| CoreError::io(Stage::Backup, format!("writing backup: {e}")))?;
    Ok(copied)
}
