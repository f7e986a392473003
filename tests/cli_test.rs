//! End-to-end tests for the recast binary

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const SCHEMA: &str = r#"
types:
  - name: PeardropDto
    rules:
      id: exclude
  - name: CountryDto
    extends: PeardropDto
  - name: VpnServerDto
    extends: PeardropDto
    rules:
      country: { transform: CountryDto, nullable: true }
"#;

const INPUT: &str = r#"[
  {"id": "a61f", "name": "lu001", "country": {"id": "e190", "code": "LU"}},
  {"id": "9428", "name": "us001", "country": null}
]"#;

fn write_schema(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("schema.yaml");
    fs::write(&path, SCHEMA).unwrap();
    path
}

fn recast(args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_recast"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }

    child.wait_with_output().unwrap()
}

#[test]
fn test_convert_from_stdin() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());

    let output = recast(
        &["convert", "--schema", schema.to_str().unwrap(), "--type", "VpnServerDto"],
        Some(INPUT),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"name": "lu001", "country": {"code": "LU"}},
            {"name": "us001", "country": null}
        ])
    );
}

#[test]
fn test_convert_file_to_ndjson() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let input = dir.path().join("servers.json");
    fs::write(&input, INPUT).unwrap();

    let output = recast(
        &[
            "convert",
            "-s",
            schema.to_str().unwrap(),
            "-t",
            "VpnServerDto",
            "-i",
            input.to_str().unwrap(),
            "-f",
            "ndjson",
        ],
        None,
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"{"name":"lu001","country":{"code":"LU"}}"#,
            r#"{"name":"us001","country":null}"#
        ]
    );
}

#[test]
fn test_unknown_type_fails() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());

    let output = recast(
        &["convert", "--schema", schema.to_str().unwrap(), "--type", "Missing"],
        None,
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown type 'Missing'"));
}

#[test]
fn test_validate_schema_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("base.yaml"),
        "types:\n  - name: PeardropDto\n    rules:\n      id: exclude\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("servers.yaml"),
        "types:\n  - name: VpnServerDto\n    extends: PeardropDto\n",
    )
    .unwrap();

    let output = recast(&["validate", "--schema", dir.path().to_str().unwrap()], None);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Types: 2"));
    assert!(stdout.contains("VpnServerDto -> PeardropDto (0 rules)"));
    assert!(stdout.contains("Rules: 1"));
}

#[test]
fn test_validate_rejects_unknown_parent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schema.yaml");
    fs::write(&path, "types:\n  - name: Widget\n    extends: Gadget\n").unwrap();

    let output = recast(&["validate", "--schema", path.to_str().unwrap()], None);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Gadget"));
}
