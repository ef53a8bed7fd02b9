//! ---
//! dnm_section: "05-networking-external-interfaces"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Command line behaviour of the generation binary."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

const SMALL_CONFIG: &str = r#"
[generator]
seed = 42

[generator.scale]
substations = 1
feeders_per_substation = { min = 2, max = 2 }
transformers_per_feeder = { min = 8, max = 8 }
customers_per_transformer = { min = 3, max = 3 }

[generator.horizon]
start = "2023-07-01T00:00:00Z"
end = "2023-07-08T00:00:00Z"
"#;

#[test]
fn print_config_emits_parseable_toml() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let output = Command::cargo_bin("dnm-synth")?
        .current_dir(dir.path())
        .env_remove("DNM_CONFIG")
        .arg("print-config")
        .output()?;
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout)?;
    assert!(text.contains("[generator.scale]"));
    assert!(text.contains("seed = 42"));
    Ok(())
}

#[test]
fn generate_writes_tables_and_manifest() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("dnm.toml");
    fs::write(&config, SMALL_CONFIG)?;
    let out = dir.path().join("data");

    Command::cargo_bin("dnm-synth")?
        .current_dir(dir.path())
        .env_remove("DNM_CONFIG")
        .args(["--config", config.to_str().unwrap_or_default(), "generate"])
        .args(["--seed", "7", "--format", "json"])
        .arg("--output")
        .arg(&out)
        .arg("--log-dir")
        .arg(dir.path().join("logs"))
        .assert()
        .success();

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("manifest.json"))?)?;
    assert_eq!(manifest["seed"], 7);
    assert_eq!(manifest["format"], "json");
    let customers = manifest["tables"]
        .as_array()
        .and_then(|tables| tables.iter().find(|t| t["table"] == "customers"))
        .cloned()
        .unwrap_or_default();
    assert_eq!(customers["rows"], 48);
    assert!(out.join("network_edges.json").exists());
    Ok(())
}

#[test]
fn missing_config_file_fails() -> anyhow::Result<()> {
    let dir = tempdir()?;
    Command::cargo_bin("dnm-synth")?
        .current_dir(dir.path())
        .args(["--config", "does-not-exist.toml", "print-config"])
        .assert()
        .failure();
    Ok(())
}
