use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cg(root: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("codegraph").unwrap();
    cmd.arg("--root").arg(root).arg("--quiet");
    cmd
}

fn setup() -> TempDir {
    let td = TempDir::new().expect("tempdir");
    fs::create_dir_all(td.path().join("src")).unwrap();
    fs::write(
        td.path().join("src/a.ts"),
        "export function add(x:number,y:number){return x+y;}\n",
    )
    .unwrap();
    td
}

#[test]
fn init_sync_stats_roundtrip() {
    let td = setup();

    cg(td.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized"));

    cg(td.path()).arg("sync").assert().success();

    let assert = cg(td.path()).arg("stats").assert().success();
    let stdout = String::from_utf8_lossy(assert.get_output().stdout.as_ref()).to_string();
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["files"], 1);
    assert_eq!(v["nodes"], 2);
    assert_eq!(v["nodes_by_kind"]["function"], 1);
    assert_eq!(v["edges_by_kind"]["contains"], 1);
}

#[test]
fn sync_requires_init() {
    let td = TempDir::new().unwrap();
    cg(td.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn double_init_fails() {
    let td = setup();
    cg(td.path()).arg("init").assert().success();
    cg(td.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn search_finds_indexed_function() {
    let td = setup();
    cg(td.path()).arg("init").assert().success();
    cg(td.path()).arg("sync").assert().success();
    cg(td.path())
        .args(["search", "add"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"add\""))
        .stdout(predicate::str::contains("score"));
}

#[test]
fn query_callers_by_qualified_name() {
    let td = setup();
    fs::write(
        td.path().join("src/b.ts"),
        "import {add} from \"./a\";\nadd(1, 2);\n",
    )
    .unwrap();
    cg(td.path()).arg("init").assert().success();
    cg(td.path()).arg("sync").assert().success();
    cg(td.path())
        .args(["query", "callers", "src/a.ts::add"])
        .assert()
        .success()
        .stdout(predicate::str::contains("b.ts"));
}

#[test]
fn yaml_output_format() {
    let td = setup();
    cg(td.path()).arg("init").assert().success();
    cg(td.path()).arg("sync").assert().success();
    cg(td.path())
        .args(["-f", "yaml", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nodes: 2"));
}

#[test]
fn uninit_refuses_without_tty_or_force() {
    let td = setup();
    cg(td.path()).arg("init").assert().success();
    // stdin is not a terminal under the test harness.
    cg(td.path())
        .arg("uninit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    cg(td.path()).args(["uninit", "--force"]).assert().success();
    assert!(!td.path().join(".codegraph").exists());
}

#[test]
fn index_explicit_paths() {
    let td = setup();
    cg(td.path()).arg("init").assert().success();
    cg(td.path())
        .args(["index", "src/a.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"files_indexed\": 1"));
}
