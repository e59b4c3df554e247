use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("rowbind_cli_test_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn rowbind(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rowbind"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run rowbind")
}

fn write_dictionary(dir: &TempDir, file: &str) -> PathBuf {
    let json = serde_json::json!({
        "tables": [
            {
                "name": "events",
                "fields": [
                    {"name": "id", "format": "uint", "size": 10, "roles": {"primary_key": true}},
                    {"name": "title", "format": "ascii", "size": 100, "description": "Title"},
                    {"name": "updsp", "format": "datetime"}
                ],
                "indices": [{"name": "title", "fields": ["title"]}]
            },
            {
                "name": "channels",
                "fields": [
                    {"name": "id", "format": "ascii", "size": 20, "roles": {"primary_key": true}},
                    {"name": "name", "format": "ascii", "size": 50}
                ]
            }
        ]
    });
    let path = dir.join(file);
    fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).expect("failed to write dictionary");
    path
}

#[test]
fn test_validate_accepts_valid_dictionary() {
    let dir = TempDir::new("validate_ok");
    let path = write_dictionary(&dir, "epg.json");

    let output = rowbind(&["validate", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 table(s)"), "stdout: {stdout}");
}

#[test]
fn test_validate_rejects_table_without_primary_key() {
    let dir = TempDir::new("validate_bad");
    let path = dir.join("bad.yaml");
    fs::write(
        &path,
        "tables:\n  - name: notes\n    fields:\n      - name: text\n        format: text\n",
    )
    .unwrap();

    let output = rowbind(&["validate", path.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("notes"), "stderr: {stderr}");
    assert!(stderr.contains("error:"), "stderr: {stderr}");
}

#[test]
fn test_validate_missing_file() {
    let dir = TempDir::new("validate_missing");
    let output = rowbind(&["validate", dir.join("missing.json").to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_ddl_prints_create_statements() {
    let dir = TempDir::new("ddl");
    let path = write_dictionary(&dir, "epg.json");

    let output = rowbind(&["ddl", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "create table events(id int(10) unsigned, title varchar(100) comment 'Title', updsp datetime, PRIMARY KEY(id DESC)) ENGINE InnoDB;",
            "create index idxtitle on events(title);",
            "create table channels(id varchar(20), name varchar(50), PRIMARY KEY(id DESC)) ENGINE InnoDB;",
        ]
    );
}

#[test]
fn test_ddl_single_table() {
    let dir = TempDir::new("ddl_table");
    let path = write_dictionary(&dir, "epg.json");

    let output = rowbind(&["ddl", path.to_str().unwrap(), "--table", "channels"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.starts_with("create table channels("));

    let output = rowbind(&["ddl", path.to_str().unwrap(), "--table", "recordings"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("recordings"));
}

#[test]
fn test_sync_requires_config() {
    let dir = TempDir::new("sync_config");
    let path = write_dictionary(&dir, "epg.json");

    let output = rowbind(&["sync", path.to_str().unwrap(), "--config", dir.join("db.yaml").to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("db.yaml"));
}
