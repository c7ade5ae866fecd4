// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end runs of the `echo-parcel` binary.
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]
#![allow(deprecated)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use echo_parcel::legacy::{encode_stream, LegacyEntry, LegacyValue, LEGACY_MAGIC};
use echo_parcel::{Parcel, WireFormat};
use predicates::prelude::*;
use tempfile::TempDir;

fn echo_parcel() -> Command {
    Command::cargo_bin("echo-parcel").unwrap()
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn native_blob() -> Vec<u8> {
    let mut parcel = Parcel::new();
    parcel.write_int(7).unwrap();
    parcel.write_string(Some("hi")).unwrap();
    parcel.marshal().unwrap()
}

fn legacy_blob() -> Vec<u8> {
    encode_stream(&[
        LegacyEntry::new(LegacyValue::Int(7)),
        LegacyEntry::new(LegacyValue::Str("hi".into())),
    ])
    .unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn inspect_native_blob_prints_a_table() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "native.bin", &native_blob());

    echo_parcel()
        .args(["inspect", arg(&file)])
        .assert()
        .success()
        .stdout(predicate::str::contains("format native size 16 capacity 16"))
        .stdout(predicate::str::contains("opaque"))
        .stdout(predicate::str::contains("zero"));
}

#[test]
fn inspect_legacy_blob_as_json() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "legacy.bin", &legacy_blob());

    let output = echo_parcel()
        .args(["inspect", arg(&file), "--format", "legacy", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["format"], "legacy");
    assert_eq!(report["size"], 16);
    assert_eq!(report["spans"][0]["kind"]["record"], "int");
    assert_eq!(report["spans"][0]["value"], "7");
    assert_eq!(report["spans"][1]["kind"]["record"], "string");
    assert_eq!(report["spans"][1]["value"], "hi");
}

#[test]
fn inspect_with_forced_native_format_fails_on_misaligned_legacy_bytes() {
    let dir = TempDir::new().unwrap();
    let mut blob = legacy_blob();
    if blob.len() % 4 == 0 {
        blob.push(0);
    }
    let file = write_file(&dir, "legacy.bin", &blob);

    echo_parcel()
        .args(["inspect", arg(&file), "--format", "native"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to unmarshal"))
        .stderr(predicate::str::contains("not 4-byte aligned"));
}

#[test]
fn config_limits_legacy_entries() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "legacy.bin", &legacy_blob());
    let config = write_file(
        &dir,
        "config.json",
        br#"{"wire_format": "legacy", "max_legacy_entries": 1}"#,
    );

    echo_parcel()
        .args(["--config", arg(&config), "inspect", arg(&file)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit is 1"));
}

#[test]
fn inspect_detects_legacy_only_on_request() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "legacy.bin", &legacy_blob());

    echo_parcel()
        .args(["inspect", arg(&file), "--format", "detect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("format legacy size 16"));

    let mut word = Parcel::new();
    word.write_int(i32::from_le_bytes(LEGACY_MAGIC)).unwrap();
    word.write_int(0).unwrap();
    let native = write_file(&dir, "magic.bin", &word.marshal().unwrap());
    echo_parcel()
        .args(["inspect", arg(&native)])
        .assert()
        .success()
        .stdout(predicate::str::contains("format native size 8"));
    echo_parcel()
        .args(["inspect", arg(&native), "--format", "detect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("format native size 8"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "native.bin", &native_blob());
    let config = write_file(&dir, "config.json", br#"{"wire_format": "xml"}"#);

    echo_parcel()
        .args(["inspect", arg(&file), "--config", arg(&config)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn missing_input_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.bin");

    echo_parcel()
        .args(["inspect", arg(&missing)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn convert_writes_native_bytes() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "legacy.bin", &legacy_blob());
    let out = dir.path().join("native.bin");

    echo_parcel()
        .args(["convert", arg(&input), "--out", arg(&out)])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 16 bytes"));

    let bytes = fs::read(&out).unwrap();
    assert_eq!(bytes, native_blob());

    let mut parcel = Parcel::new();
    parcel
        .unmarshal_as(WireFormat::Native, &bytes, 0, bytes.len())
        .unwrap();
    parcel.set_data_position(0);
    assert_eq!(parcel.read_int().unwrap(), 7);
    assert_eq!(parcel.read_string().unwrap().as_deref(), Some("hi"));
}

#[test]
fn convert_rejects_native_input() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "native.bin", &native_blob());
    let out = dir.path().join("out.bin");

    echo_parcel()
        .args(["convert", arg(&input), "--out", arg(&out)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to decode legacy stream"));
    assert!(!out.exists());
}
