use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use tempfile::TempDir;

#[test]
fn test_missing_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("unitiger")?;
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_chain_with_containment_yields_one_unitig() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().join("output");

    let mut cmd = Command::cargo_bin("unitiger")?;
    cmd.arg("-f")
        .arg("tests/data/chain.frg")
        .arg("-o")
        .arg("tests/data/chain.ovl")
        .arg("-l")
        .arg("tests/data/chain.lib")
        .arg("-d")
        .arg(output_dir.to_str().unwrap())
        .arg("-t")
        .arg("2");

    cmd.assert().success();

    assert!(output_dir.exists());
    assert!(output_dir.join("best_graph.bin").exists());
    assert!(output_dir.join("best_edges.tsv").exists());
    assert!(output_dir.join("mate_happiness.tsv").exists());

    // 8-fragment dovetail chain plus one contained fragment: one unitig
    // holding all 9 fragments
    let layout = fs::read_to_string(output_dir.join("unitigs.layout"))?;
    let headers: Vec<&str> = layout
        .lines()
        .filter(|l| l.starts_with("unitig "))
        .collect();
    assert_eq!(headers.len(), 1, "expected 1 unitig, layout:\n{}", layout);
    let frg_lines = layout.lines().filter(|l| l.starts_with("FRG ")).count();
    assert_eq!(frg_lines, 9);
    assert!(layout.contains("len 660"), "layout:\n{}", layout);

    let partition = fs::read_to_string(output_dir.join("partitioning.tsv"))?;
    assert!(partition.lines().any(|l| !l.starts_with('#')));

    Ok(())
}

#[test]
fn test_resume_from_checkpoint() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().join("output");

    let run = |dir: &Path| -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("unitiger")?;
        cmd.arg("-f")
            .arg("tests/data/chain.frg")
            .arg("-o")
            .arg("tests/data/chain.ovl")
            .arg("-d")
            .arg(dir.to_str().unwrap())
            .arg("-t")
            .arg("2");
        cmd.assert().success();
        Ok(())
    };

    run(&output_dir)?;
    let first = fs::read_to_string(output_dir.join("unitigs.layout"))?;
    // second run resumes from best_graph.bin and must agree
    run(&output_dir)?;
    let second = fs::read_to_string(output_dir.join("unitigs.layout"))?;
    assert_eq!(first, second);

    Ok(())
}
