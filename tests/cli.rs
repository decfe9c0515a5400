//! CLI tests: run the `ipcmsgc` binary against schema files in a temp dir.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const GHOST_IPC: &str = r#"
table (name, value, desc, shortname, data_fields, va_data) {
    ("PING", _, "Test ping message", "ping", ["int a"], _),
    ("PONG", _, "Test pong message", "pong", ["int b"], ("char", "a")),
}
"#;

fn ipcmsgc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ipcmsgc"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run ipcmsgc")
}

fn write_schema(dir: &Path, source: &str) -> String {
    let path = dir.join("ghost.schema");
    fs::write(&path, source).expect("write schema");
    path.to_string_lossy().into_owned()
}

#[test]
fn generate_writes_header_to_out_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let out = dir.path().join("gen");
    let out_str = out.to_string_lossy().into_owned();

    let output = ipcmsgc(&["generate", &schema, "-o", &out_str]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let header = fs::read_to_string(out.join("gh_ipcmsg_type.h")).expect("header");
    assert!(header.starts_with("// Generated by ipcmsgc from ghost.schema. Do not edit.\n"));
    assert!(header.contains("GH_IPCMSG_PONG = 1,"));
    assert!(!out.join("gh_ipcmsg_type.c").exists());
}

#[test]
fn generate_prints_to_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let output = ipcmsgc(&["generate", &schema, "--stdout"]);
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8");
    assert!(text.contains("gh_ipcmsg_ping_new("));
    assert_eq!(text, ipcmsgc::compile(GHOST_IPC, "ghost.schema", &[]).expect("compile")[0].text);
}

#[test]
fn generate_split_writes_two_units() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let out = dir.path().to_string_lossy().into_owned();
    let output = ipcmsgc(&["generate", &schema, "-o", &out, "--split", "--prefix", "rpc"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let source = fs::read_to_string(dir.path().join("rpc_type.c")).expect("source");
    assert!(source.contains("#include \"rpc_type.h\""));
    assert!(dir.path().join("rpc_type.h").exists());
}

#[test]
fn generate_legacy_size_field_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let output = ipcmsgc(&["generate", &schema, "--legacy-size-field"]);
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8");
    assert!(text.contains("msg->size = sizeof(gh_ipcmsg_pong) + a_count;"));
}

#[test]
fn generate_fails_on_bad_schema_without_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(
        dir.path(),
        r#"table (name, value, shortname) { ("A", 1, "a"), ("B", 1, "b") }"#,
    );
    let out = dir.path().join("gen");
    let out_str = out.to_string_lossy().into_owned();
    let output = ipcmsgc(&["generate", &schema, "-o", &out_str]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("discriminant"), "{stderr}");
    assert!(!out.exists());

    let output = ipcmsgc(&["generate", &schema, "--stdout", "--permissive-discriminants"]);
    assert!(output.status.success());
}

#[test]
fn failed_split_write_leaves_no_units_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let out = dir.path().join("gen");
    fs::create_dir_all(out.join("gh_ipcmsg_type.c")).expect("blocking dir");
    let out_str = out.to_string_lossy().into_owned();

    let output = ipcmsgc(&["generate", &schema, "-o", &out_str, "--split"]);
    assert!(!output.status.success());
    assert!(!out.join("gh_ipcmsg_type.h").exists());
    let entries: Vec<_> = fs::read_dir(&out)
        .expect("read out dir")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("gh_ipcmsg_type.c")]);
}

#[test]
fn generate_overwrites_existing_units() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let out = dir.path().join("gen");
    fs::create_dir_all(&out).expect("mkdir");
    fs::write(out.join("gh_ipcmsg_type.h"), "stale").expect("write");
    let out_str = out.to_string_lossy().into_owned();

    let output = ipcmsgc(&["generate", &schema, "-o", &out_str]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let header = fs::read_to_string(out.join("gh_ipcmsg_type.h")).expect("header");
    assert!(header.contains("GH_IPCMSG_PING = 0,"));
    assert_eq!(fs::read_dir(&out).expect("read out dir").count(), 1);
}

#[test]
fn generate_fails_on_missing_file() {
    let output = ipcmsgc(&["generate", "/nonexistent/ghost.schema"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("reading"));
}

#[test]
fn out_dir_conflicts_with_stdout() {
    let output = ipcmsgc(&["generate", "x.schema", "-o", "out", "--stdout"]);
    assert!(!output.status.success());
}

#[test]
fn describe_prints_layout_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = write_schema(dir.path(), GHOST_IPC);
    let output = ipcmsgc(&["describe", &schema]);
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    let ping: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(&ping[..5], &["PING", "gh_ipcmsg_ping", "0", "24", "-"]);
    let pong: Vec<&str> = lines[2].split_whitespace().collect();
    assert_eq!(&pong[..5], &["PONG", "gh_ipcmsg_pong", "1", "24", "1"]);
    assert!(lines[2].ends_with("Test pong message"));

    let output = ipcmsgc(&["describe", &schema, "--model", "ilp32"]);
    let text = String::from_utf8(output.stdout).expect("utf8");
    assert!(text.lines().nth(1).expect("row").split_whitespace().any(|w| w == "12"));
}
