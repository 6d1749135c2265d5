use std::fs;
use std::process::Command;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

fn engine() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mirage_engine"))
}

#[test]
fn save_then_load_reproduces_the_world_state() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let slot = dir.path().join("slot0.sav");
    let saved_json = dir.path().join("saved.json");
    let loaded_json = dir.path().join("loaded.json");

    let slot_str = slot.to_str().context("slot path is not valid UTF-8")?;

    let status = engine()
        .args([
            "--save",
            slot_str,
            "--description",
            "regression slot",
            "--state-json",
            saved_json.to_str().context("saved path")?,
        ])
        .status()
        .context("running save")?;
    assert!(status.success(), "save exited with {status:?}");
    assert!(slot.is_file(), "save produced no slot file");

    let status = engine()
        .args([
            "--load",
            slot_str,
            "--state-json",
            loaded_json.to_str().context("loaded path")?,
        ])
        .status()
        .context("running load")?;
    assert!(status.success(), "load exited with {status:?}");

    let saved: Value = serde_json::from_str(&fs::read_to_string(&saved_json)?)?;
    let loaded: Value = serde_json::from_str(&fs::read_to_string(&loaded_json)?)?;
    assert_eq!(
        saved, loaded,
        "world state changed across the save/load round trip"
    );

    // Spot-check the cyclic relationships made it into the report at all.
    assert_eq!(saved["rooms"][0]["name"], "alley");
    assert_eq!(saved["rooms"][0]["exits"][0], "office");
    assert_eq!(saved["rooms"][1]["exits"][0], "alley");
    assert_eq!(saved["props"][0]["holder"], "guide");
    assert_eq!(saved["state"]["current_room"], "office");
    Ok(())
}

#[test]
fn inspect_reads_the_header_without_a_load() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let slot = dir.path().join("slot1.sav");
    let summary_json = dir.path().join("summary.json");

    let status = engine()
        .args([
            "--save",
            slot.to_str().context("slot path")?,
            "--description",
            "year two",
        ])
        .status()
        .context("running save")?;
    assert!(status.success());

    let status = engine()
        .args([
            "--inspect",
            slot.to_str().context("slot path")?,
            "--summary-json",
            summary_json.to_str().context("summary path")?,
        ])
        .status()
        .context("running inspect")?;
    assert!(status.success());

    let summary: Value = serde_json::from_str(&fs::read_to_string(&summary_json)?)?;
    assert_eq!(summary["description"], "year two");
    assert_eq!(summary["format_major"], 1);
    assert_eq!(summary["has_thumbnail"], false);
    Ok(())
}

#[test]
fn corrupt_slot_fails_cleanly() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let slot = dir.path().join("garbage.sav");
    fs::write(&slot, b"MRSVgarbage that is not a save image")?;

    let status = engine()
        .args(["--load", slot.to_str().context("slot path")?])
        .status()
        .context("running load")?;
    assert!(
        !status.success(),
        "loading a corrupt slot must fail, not succeed"
    );
    Ok(())
}
