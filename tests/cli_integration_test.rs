use std::fs;
use std::process::Command;
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_xsd-bundle");

const ADDR_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:x" elementFormDefault="qualified">
    <xs:element name="Address">
        <xs:complexType/>
    </xs:element>
</xs:schema>"#;

const VALID_XML: &str = r#"<Address xmlns="urn:x"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xsi:schemaLocation="urn:x addr.xsd"/>"#;

const INVALID_XML: &str = r#"<Address xmlns="urn:x"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xsi:schemaLocation="urn:x addr.xsd"><Extra/></Address>"#;

/// Pack a single-schema bundle and return its path.
fn pack_bundle(dir: &TempDir) -> std::path::PathBuf {
    let schema_path = dir.path().join("addr.xsd");
    fs::write(&schema_path, ADDR_XSD).unwrap();

    let out_dir = dir.path().join("out");
    let bundle_path = out_dir.join("addr.xsdb");
    let status = Command::new(BIN)
        .args(["pack"])
        .arg(&schema_path)
        .arg("--out-dir")
        .arg(&out_dir)
        .args(["--name", "addr.xsdb"])
        .status()
        .expect("failed to run xsd-bundle pack");
    assert!(status.success());
    assert!(bundle_path.exists());
    bundle_path
}

#[test]
fn test_cli_pack_validate_inspect() {
    let dir = TempDir::new().unwrap();
    let bundle_path = pack_bundle(&dir);

    let valid_path = dir.path().join("valid.xml");
    fs::write(&valid_path, VALID_XML).unwrap();
    let status = Command::new(BIN)
        .args(["validate", "-b"])
        .arg(&bundle_path)
        .arg(&valid_path)
        .status()
        .unwrap();
    assert!(status.success());

    let output = Command::new(BIN)
        .args(["inspect"])
        .arg(&bundle_path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("urn:x"));
    assert!(stdout.contains("addr.xsd"));
    assert!(stdout.contains("(entrypoint)"));
}

#[test]
fn test_cli_validate_invalid_document_fails() {
    let dir = TempDir::new().unwrap();
    let bundle_path = pack_bundle(&dir);

    let invalid_path = dir.path().join("invalid.xml");
    fs::write(&invalid_path, INVALID_XML).unwrap();

    let output = Command::new(BIN)
        .args(["validate", "-b"])
        .arg(&bundle_path)
        .arg(&invalid_path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("invalid"));
}

#[test]
fn test_cli_validate_directory_json() {
    let dir = TempDir::new().unwrap();
    let bundle_path = pack_bundle(&dir);

    let docs = dir.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.xml"), VALID_XML).unwrap();
    fs::write(docs.join("b.xml"), INVALID_XML).unwrap();
    fs::write(docs.join("ignored.txt"), "not xml").unwrap();

    let output = Command::new(BIN)
        .args(["validate", "--format", "json", "-b"])
        .arg(&bundle_path)
        .arg(&docs)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json output expected");
    assert_eq!(value["summary"]["total"], 2);
    assert_eq!(value["summary"]["valid"], 1);
    assert_eq!(value["summary"]["invalid"], 1);
}

#[test]
fn test_cli_inspect_missing_bundle() {
    let output = Command::new(BIN)
        .args(["inspect", "/nonexistent/missing.xsdb"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.xsdb"));
}
