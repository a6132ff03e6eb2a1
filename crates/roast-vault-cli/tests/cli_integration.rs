use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_rv<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_rv"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute rv binary: {err}"))
}

fn parse_stdout(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_rv(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "rv command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }
    parse_stdout(&output)
}

fn run_failure<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_rv(args);
    assert!(
        !output.status.success(),
        "rv command unexpectedly succeeded:\n{}",
        String::from_utf8_lossy(&output.stdout)
    );
    parse_stdout(&output)
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_bool(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or_else(|| panic!("missing bool field `{key}` in payload: {value}"))
}

fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).unwrap_or_else(|| panic!("missing field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn add_roast(db: &str, content: &str, category: &str) -> String {
    let added = run_json([
        "--db",
        db,
        "roast",
        "add",
        "--content",
        content,
        "--category",
        category,
        "--spice",
        "3",
    ]);
    as_str(field(&added, "roast"), "id").to_string()
}

// Test IDs: TCLI-001
#[test]
fn roast_commands_round_trip_through_sqlite() {
    let dir = unique_temp_dir("rv-cli-roasts");
    let db = dir.join("vault.sqlite3");
    let db = path_str(&db);

    let first = add_roast(db, "Deadline moved to yesterday", "deadline");
    let _second = add_roast(db, "Meeting that could have been an email", "meeting");

    let listed = run_json(["--db", db, "roast", "list"]);
    assert_eq!(as_str(&listed, "contract_version"), "cli.v1");
    assert_eq!(as_i64(&listed, "total"), 2);

    let favorite = run_json(["--db", db, "roast", "favorite", "--id", &first]);
    assert!(as_bool(&favorite, "found"));
    assert!(as_bool(&favorite, "is_favorite"));

    let missing = run_json([
        "--db",
        db,
        "roast",
        "favorite",
        "--id",
        "01ARZ3NDEKTSV4RRFFQ69G5FAV",
    ]);
    assert!(!as_bool(&missing, "found"));

    let deleted = run_json(["--db", db, "roast", "delete", "--id", &first]);
    assert!(as_bool(&deleted, "deleted"));

    let cleared = run_json(["--db", db, "roast", "clear"]);
    assert_eq!(as_i64(&cleared, "removed"), 1);

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}

// Test IDs: TCLI-002
#[test]
fn vault_export_verify_and_import_into_fresh_db() {
    let dir = unique_temp_dir("rv-cli-vault");
    let source_db = dir.join("source.sqlite3");
    let target_db = dir.join("target.sqlite3");
    let export_path = dir.join("export.json");
    let source = path_str(&source_db);
    let target = path_str(&target_db);
    let export = path_str(&export_path);

    let id = add_roast(source, "Overtime again, on a Friday", "overtime");
    add_roast(source, "Salary review postponed indefinitely", "salary");
    run_json(["--db", source, "roast", "favorite", "--id", &id]);

    let exported = run_json(["--db", source, "vault", "export", "--out", export]);
    assert_eq!(as_str(&exported, "status"), "exported");
    let summary = field(&exported, "export");
    assert_eq!(as_i64(summary, "total_roasts"), 2);
    assert_eq!(as_i64(summary, "total_favorites"), 1);
    assert!(export_path.exists());

    let verified = run_json(["--db", source, "vault", "verify", "--in", export]);
    assert!(as_bool(&verified, "valid"));
    assert!(as_bool(&verified, "byte_exact"));
    assert_eq!(as_str(&verified, "checksum"), as_str(summary, "checksum"));

    let preview = run_json(["--db", target, "vault", "preview", "--in", export]);
    let preview = field(&preview, "preview");
    assert_eq!(as_i64(preview, "new_items"), 2);
    assert_eq!(as_i64(preview, "duplicate_items"), 0);
    assert!(as_bool(preview, "is_compatible"));

    let imported = run_json(["--db", target, "vault", "import", "--in", export]);
    assert_eq!(as_str(&imported, "strategy"), "merge");
    assert_eq!(as_i64(field(&imported, "report"), "succeeded"), 2);
    assert_eq!(as_i64(&imported, "total"), 2);

    let again = run_json(["--db", target, "vault", "import", "--in", export]);
    assert_eq!(as_i64(field(&again, "report"), "skipped"), 2);
    assert_eq!(as_i64(&again, "total"), 2);

    let listed = run_json(["--db", target, "roast", "list"]);
    let roasts = field(&listed, "roasts")
        .as_array()
        .unwrap_or_else(|| panic!("roasts should be an array: {listed}"));
    let favorite = roasts
        .iter()
        .find(|roast| as_str(roast, "id") == id)
        .unwrap_or_else(|| panic!("exported roast {id} missing after import: {listed}"));
    assert!(as_bool(favorite, "isFavorite"));

    let replaced = run_json([
        "--db", target, "vault", "import", "--in", export, "--strategy", "replace",
    ]);
    assert_eq!(as_str(&replaced, "strategy"), "replace");
    assert_eq!(as_i64(&replaced, "total"), 2);

    let scan = run_json(["--db", target, "vault", "integrity-check"]);
    assert!(as_bool(&scan, "clean"));

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}

// Test IDs: TCLI-003
#[test]
fn tampered_export_is_rejected_and_logged() {
    let dir = unique_temp_dir("rv-cli-tamper");
    let source_db = dir.join("source.sqlite3");
    let target_db = dir.join("target.sqlite3");
    let export_path = dir.join("export.json");
    let source = path_str(&source_db);
    let target = path_str(&target_db);
    let export = path_str(&export_path);

    add_roast(source, "Monday standup ran two hours", "mondayMorning");
    run_json(["--db", source, "vault", "export", "--out", export]);

    let body = fs::read_to_string(&export_path)
        .unwrap_or_else(|err| panic!("failed to read export {}: {err}", export_path.display()));
    let tampered = body.replace("ran two hours", "ran three hours");
    assert_ne!(body, tampered);
    fs::write(&export_path, tampered)
        .unwrap_or_else(|err| panic!("failed to write export {}: {err}", export_path.display()));

    let verify = run_failure(["--db", target, "vault", "verify", "--in", export]);
    assert_eq!(as_str(field(&verify, "error"), "code"), "IMPORT_CHECKSUM_MISMATCH");

    let failed = run_failure(["--db", target, "vault", "import", "--in", export]);
    assert_eq!(as_str(&failed, "status"), "error");
    assert_eq!(as_str(field(&failed, "error"), "code"), "IMPORT_CHECKSUM_MISMATCH");
    let options = field(&failed, "recovery_options")
        .as_array()
        .unwrap_or_else(|| panic!("recovery_options should be an array: {failed}"));
    assert_eq!(options.iter().filter(|option| as_bool(option, "is_recommended")).count(), 1);

    let listed = run_json(["--db", target, "roast", "list"]);
    assert_eq!(as_i64(&listed, "total"), 0);

    let log = run_json(["--db", target, "recovery", "log"]);
    assert_eq!(as_i64(&log, "total"), 1);
    let entry = &field(&log, "entries")[0];
    assert_eq!(as_str(entry, "error_code"), "IMPORT_CHECKSUM_MISMATCH");
    assert_eq!(as_str(entry, "phase"), "verifying_checksum");

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}

// Test IDs: TCLI-004
#[test]
fn invalid_input_reports_stable_codes() {
    let dir = unique_temp_dir("rv-cli-invalid");
    let db = dir.join("vault.sqlite3");
    let db = path_str(&db);
    let garbage = dir.join("garbage.json");
    fs::write(&garbage, "not json at all")
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", garbage.display()));

    let failed = run_failure(["--db", db, "vault", "import", "--in", path_str(&garbage)]);
    assert_eq!(as_str(field(&failed, "error"), "code"), "IMPORT_INVALID_FORMAT");

    let missing = dir.join("missing.json");
    let failed = run_failure(["--db", db, "vault", "import", "--in", path_str(&missing)]);
    assert_eq!(as_str(field(&failed, "error"), "code"), "IO_FILE_NOT_FOUND");

    let invalid_roast = run_failure([
        "--db", db, "roast", "add", "--content", "   ", "--category", "boss", "--spice", "9",
    ]);
    assert_eq!(as_str(field(&invalid_roast, "error"), "code"), "VALIDATION_FAILED");

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}

// Test IDs: TCLI-005
#[test]
fn streak_check_is_idempotent_per_day_and_resets() {
    let dir = unique_temp_dir("rv-cli-streak");
    let db = dir.join("vault.sqlite3");
    let db = path_str(&db);

    let first = run_json(["--db", db, "streak", "check", "--date", "2026-03-02"]);
    assert_eq!(as_str(&first, "outcome"), "restarted");

    let repeat = run_json(["--db", db, "streak", "check", "--date", "2026-03-02"]);
    assert_eq!(as_str(&repeat, "outcome"), "already_counted");

    let next = run_json(["--db", db, "streak", "check", "--date", "2026-03-03"]);
    assert_eq!(as_str(&next, "outcome"), "extended");
    assert_eq!(as_i64(field(&next, "streak"), "currentStreak"), 2);

    let shown = run_json(["--db", db, "streak", "show"]);
    assert_eq!(as_str(field(&shown, "streak"), "lastActiveDate"), "2026-03-03");

    let reset = run_json(["--db", db, "streak", "reset"]);
    assert_eq!(as_i64(field(&reset, "streak"), "currentStreak"), 0);

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}

// Test IDs: TCLI-006
#[test]
fn unreadable_inputs_report_resource_errors() {
    let dir = unique_temp_dir("rv-cli-missing");
    let db = dir.join("vault.sqlite3");
    let db = path_str(&db);
    let missing = dir.join("missing.json");
    let missing = path_str(&missing);

    for command in ["preview", "verify"] {
        let failed = run_failure(["--db", db, "vault", command, "--in", missing]);
        let error = field(&failed, "error");
        assert_eq!(as_str(error, "code"), "IO_FILE_NOT_FOUND", "{command}");
        assert_eq!(as_str(error, "kind"), "resource", "{command}");
        let options = field(&failed, "recovery_options")
            .as_array()
            .unwrap_or_else(|| panic!("recovery_options should be an array: {failed}"));
        assert_eq!(
            options.iter().filter(|option| as_bool(option, "is_recommended")).count(),
            1,
            "{command}"
        );
    }

    fs::remove_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to cleanup temp dir {}: {err}", dir.display()));
}
