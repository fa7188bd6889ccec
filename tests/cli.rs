//! Tests for the `lazytrace` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn lazytrace(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lazytrace"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run lazytrace")
}

#[test]
fn toggle_prints_to_stdout_and_leaves_file() {
    let tmp = tempfile::tempdir().unwrap();
    let source = "function add(a, b) {\n  return a + b;\n}\n";
    fs::write(tmp.path().join("math.js"), source).unwrap();

    let output = lazytrace(&["toggle", "math.js", "--line", "2"], tmp.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#"console.log("**add - START", {"#), "Got:\n{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("decorated: add"), "Got:\n{stderr}");

    assert_eq!(fs::read_to_string(tmp.path().join("math.js")).unwrap(), source);
}

#[test]
fn toggle_write_twice_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("api.ts");
    fs::write(&file, "export const load = async (id: string) => fetchUser(id);\n").unwrap();

    let first = lazytrace(&["toggle", "api.ts", "--line", "1", "--write"], tmp.path());
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    let decorated = fs::read_to_string(&file).unwrap();
    assert!(decorated.contains("**load - START"), "Got:\n{decorated}");

    let second = lazytrace(
        &["toggle", "api.ts", "--line", "1", "--write", "--json"],
        tmp.path(),
    );
    assert!(second.status.success(), "stderr: {}", String::from_utf8_lossy(&second.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert_eq!(summary["name"], "load");
    assert_eq!(summary["action"], "undecorated");
    assert_eq!(summary["skipped_params"], serde_json::json!([]));

    let restored = fs::read_to_string(&file).unwrap();
    assert!(!restored.contains("console.log"), "Got:\n{restored}");
    assert!(restored.contains("fetchUser(id)"), "Got:\n{restored}");
}

#[test]
fn trace_call_comes_from_config_and_flag() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("lazytrace.toml"),
        "[trace]\ncall = \"logger.debug\"\n",
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/job.js"), "function job() {\n  step();\n}\n").unwrap();

    let from_config = lazytrace(&["toggle", "src/job.js", "--line", "2"], tmp.path());
    assert!(from_config.status.success());
    let stdout = String::from_utf8_lossy(&from_config.stdout);
    assert!(stdout.contains(r#"logger.debug("**job - START")"#), "Got:\n{stdout}");

    let from_flag = lazytrace(
        &["toggle", "src/job.js", "--line", "2", "--trace-call", "trace"],
        tmp.path(),
    );
    assert!(from_flag.status.success());
    let stdout = String::from_utf8_lossy(&from_flag.stdout);
    assert!(stdout.contains(r#"trace("**job - START")"#), "Got:\n{stdout}");
}

#[test]
fn invalid_trace_call_flag_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.js"), "function a() {}\n").unwrap();

    let output = lazytrace(
        &["toggle", "a.js", "--line", "1", "--trace-call", "console.log()"],
        tmp.path(),
    );
    assert!(!output.status.success());
}

#[test]
fn no_enclosing_function_exits_with_error() {
    let tmp = tempfile::tempdir().unwrap();
    let source = "const a = 1;\n";
    fs::write(tmp.path().join("a.js"), source).unwrap();

    let output = lazytrace(&["toggle", "a.js", "--line", "1", "--write"], tmp.path());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: no function encloses line 1"), "Got:\n{stderr}");
    assert_eq!(fs::read_to_string(tmp.path().join("a.js")).unwrap(), source);
}

#[test]
fn missing_file_reports_path() {
    let tmp = tempfile::tempdir().unwrap();
    let output = lazytrace(&["inspect", "nope.js", "--line", "1"], tmp.path());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read nope.js"), "Got:\n{stderr}");
}

#[test]
fn inspect_reports_name_and_state() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("widget.jsx"),
        "export default () => {\n  return <div onClick={() => save()} />;\n};\n",
    )
    .unwrap();

    let output = lazytrace(&["inspect", "widget.jsx", "--line", "2", "--json"], tmp.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let inspection: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(inspection["name"], "onClick");
    assert_eq!(inspection["kind"], "arrow function");
    assert_eq!(inspection["decorated"], false);

    let output = lazytrace(&["inspect", "widget.jsx", "--line", "1"], tmp.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("widget-default-export (arrow function, lines 1-3): not traced"),
        "Got:\n{stdout}"
    );
}
