use std::fs;
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

fn save_with_flags(flags: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<savegame><universe>",
            "<component class=\"npc\" stockid=\"default_shadyguy\" owner=\"scaleplate\" ",
            "name=\"Nopileos\" code=\"QRT-819\"><traits flags=\"{}\"/></component>",
            "</universe></savegame>\n"
        ),
        flags
    )
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_x4-shady"))
        .args(args)
        .output()
        .expect("failed to run x4-shady CLI")
}

fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    let root = std::env::temp_dir().join(format!(
        "x4_shady_cli_{}_{}_{}",
        prefix,
        std::process::id(),
        nanos
    ));
    fs::create_dir_all(&root).expect("failed to create temp root");
    root
}

fn write_gz(path: &Path, xml: &str) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .expect("gzip encode should write content");
    let packed = encoder.finish().expect("gzip encode should finish");
    fs::write(path, packed).expect("failed to write save fixture");
}

fn read_gz(path: &Path) -> String {
    let packed = fs::read(path).expect("save should be readable");
    let mut xml = String::new();
    GzDecoder::new(packed.as_slice())
        .read_to_string(&mut xml)
        .expect("save should be gzip XML");
    xml
}

fn bak(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[test]
fn unlocks_marketeer_and_reports_progress() {
    let root = temp_dir("unlock");
    let path = root.join("quicksave.xml.gz");
    write_gz(&path, &save_with_flags("tradedock"));
    let pristine = fs::read(&path).expect("fixture readable");
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&[&path_s]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 1 black marketeers"));
    assert!(stdout.contains("Unlocked Nopileos (QRT-819) of faction scaleplate"));
    assert!(stdout.contains("1 unlocked, 0 already unlocked, 0 skipped"));

    assert_eq!(read_gz(&path), save_with_flags("tradedock|tradesvisible"));
    assert_eq!(fs::read(bak(&path)).expect("backup should exist"), pristine);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn already_unlocked_marketeer_is_reported() {
    let root = temp_dir("already");
    let path = root.join("quicksave.xml.gz");
    let original = save_with_flags("tradedock|tradesvisible");
    write_gz(&path, &original);
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&[&path_s]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Nopileos (QRT-819) of faction scaleplate is already unlocked"));
    assert!(stdout.contains("0 unlocked, 1 already unlocked, 0 skipped"));
    assert_eq!(read_gz(&path), original);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn json_summary_describes_run() {
    let root = temp_dir("json");
    let path = root.join("quicksave.xml.gz");
    write_gz(&path, &save_with_flags("tradedock"));
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&["--json", &path_s]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["unlocked"], 1);
    assert_eq!(json["backup"], "created");
    assert_eq!(json["final_state"], "done");
    assert_eq!(json["report"]["found"], 1);
    assert_eq!(json["report"]["entries"][0]["code"], "QRT-819");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dry_run_leaves_files_untouched() {
    let root = temp_dir("dry");
    let path = root.join("quicksave.xml.gz");
    write_gz(&path, &save_with_flags("tradedock"));
    let pristine = fs::read(&path).expect("fixture readable");
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&["--dry-run", &path_s]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Found 1 black marketeers"));

    assert_eq!(fs::read(&path).expect("save readable"), pristine);
    assert!(!bak(&path).exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn custom_stock_id_selects_other_components() {
    let root = temp_dir("stock_id");
    let path = root.join("quicksave.xml.gz");
    let original = save_with_flags("tradedock");
    write_gz(&path, &original);
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&["--stock-id", "default_trader", &path_s]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Found 0 black marketeers"));
    assert_eq!(read_gz(&path), original);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_save_fails_without_backup() {
    let root = temp_dir("missing");
    let path = root.join("absent.xml.gz");
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&[&path_s]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error processing"));
    assert!(!path.exists());
    assert!(!bak(&path).exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_save_json_reports_error() {
    let root = temp_dir("missing_json");
    let path = root.join("absent.xml.gz");
    let path_s = path.to_string_lossy().to_string();

    let output = run_cli(&["--json", &path_s]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["status"], "error");
    assert_eq!(json["stage"], "backup");
    assert_eq!(json["code"], "Io");

    let _ = fs::remove_dir_all(&root);
}

#[cfg(target_os = "linux")]
#[test]
fn json_summary_that_cannot_render_is_a_failure() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let root = temp_dir("json_non_utf8");
    let dir = root.join(OsStr::from_bytes(b"saves_\xff"));
    fs::create_dir_all(&dir).expect("failed to create non-UTF-8 directory");
    let path = dir.join("quicksave.xml.gz");
    write_gz(&path, &save_with_flags("tradedock"));

    let output = Command::new(env!("CARGO_BIN_EXE_x4-shady"))
        .arg("--json")
        .arg(&path)
        .output()
        .expect("failed to run x4-shady CLI");
    assert_eq!(output.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("\"ok\""));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error rendering JSON output"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn wrong_argument_count_prints_usage_and_exits_zero() {
    let output = run_cli(&[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));

    let output = run_cli(&["one.xml.gz", "two.xml.gz"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}
