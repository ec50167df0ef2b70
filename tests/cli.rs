use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

const SAMPLES: usize = 24;
const MARKERS: usize = 6;

fn marker_value(i: usize, j: usize) -> i32 {
    ((i * 31 + j * 17 + (i * j) % 7) % 3) as i32 - 1
}

fn write_inputs(dir: &Path) {
    let mut markers = String::from("sample_id");
    for j in 0..MARKERS {
        markers.push_str(&format!("\tm{j}"));
    }
    markers.push('\n');
    let mut phenotypes = String::from("sample_id\theight\n");
    for i in 0..SAMPLES {
        markers.push_str(&format!("s{i}"));
        let mut height = 100.0;
        for j in 0..MARKERS {
            let value = marker_value(i, j);
            markers.push_str(&format!("\t{value}"));
            height += value as f64 * if j < 2 { 3.0 } else { 0.5 };
        }
        markers.push('\n');
        phenotypes.push_str(&format!("s{i}\t{height}\n"));
    }
    fs::write(dir.join("markers.tsv"), markers).expect("write markers");
    fs::write(dir.join("phenotypes.tsv"), phenotypes).expect("write phenotypes");

    let mut test = String::from("sample_id");
    // Columns deliberately out of training order.
    for j in (0..MARKERS).rev() {
        test.push_str(&format!("\tm{j}"));
    }
    test.push('\n');
    for i in 0..4 {
        test.push_str(&format!("new{i}"));
        for j in (0..MARKERS).rev() {
            test.push_str(&format!("\t{}", marker_value(i + 50, j)));
        }
        test.push('\n');
    }
    fs::write(dir.join("test_markers.tsv"), test).expect("write test markers");
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_genomic-neuralnet"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run genomic-neuralnet cli")
}

#[test]
fn optimize_then_compare_writes_a_summary() {
    let tmp = tempdir().expect("temporary directory");
    write_inputs(tmp.path());

    let output = run(
        tmp.path(),
        &[
            "optimize",
            "markers.tsv",
            "phenotypes.tsv",
            "--trait",
            "height",
            "--predictor",
            "rr_alpha=1",
            "--predictor",
            "ols",
            "--folds",
            "3",
            "--runs",
            "1",
            "--species",
            "wheat",
            "--shelf",
            "shelves",
        ],
    );
    assert!(output.status.success(), "optimize failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rr_alpha=1 accuracy: mean"), "{stdout}");
    assert!(stdout.contains("ols accuracy: mean"), "{stdout}");
    assert!(tmp.path().join("shelves").join("index.json").exists());

    let output = run(
        tmp.path(),
        &["compare", "--shelf", "shelves", "--output", "summary.tsv"],
    );
    assert!(output.status.success(), "compare failed: {output:?}");
    let summary = fs::read_to_string(tmp.path().join("summary.tsv")).expect("read summary");
    let mut lines = summary.lines();
    assert_eq!(
        lines.next(),
        Some("species\ttrait\tmodel\tmean\tsd\tcount\tstd_error\tci95\thidden")
    );
    let models: Vec<&str> = lines
        .map(|line| line.split('\t').nth(2).expect("model column"))
        .collect();
    assert_eq!(models, vec!["OLS", "RR"]);
}

#[test]
fn predict_writes_one_row_per_test_sample() {
    let tmp = tempdir().expect("temporary directory");
    write_inputs(tmp.path());

    let output = run(
        tmp.path(),
        &[
            "predict",
            "markers.tsv",
            "phenotypes.tsv",
            "--test-markers",
            "test_markers.tsv",
            "--trait",
            "height",
            "--hidden",
            "3",
            "--epochs",
            "20",
            "--seed",
            "7",
        ],
    );
    assert!(output.status.success(), "predict failed: {output:?}");

    let predictions =
        fs::read_to_string(tmp.path().join("predictions.tsv")).expect("read predictions");
    let lines: Vec<&str> = predictions.lines().collect();
    assert_eq!(lines[0], "sample_id\tprediction");
    assert_eq!(lines.len(), 5);
    for (i, line) in lines[1..].iter().enumerate() {
        let (id, value) = line.split_once('\t').expect("two columns");
        assert_eq!(id, format!("new{i}"));
        assert!(value.parse::<f64>().expect("numeric prediction").is_finite());
    }
}

#[test]
fn unknown_predictor_fails_with_a_message() {
    let tmp = tempdir().expect("temporary directory");
    write_inputs(tmp.path());

    let output = run(
        tmp.path(),
        &[
            "optimize",
            "markers.tsv",
            "phenotypes.tsv",
            "--predictor",
            "svm_c=1",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Unrecognized predictor 'svm_c=1'"), "{stderr}");
}

#[test]
fn version_reports_the_package_version() {
    let tmp = tempdir().expect("temporary directory");
    let output = run(tmp.path(), &["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("genomic-neuralnet {}", env!("CARGO_PKG_VERSION"))));
}
