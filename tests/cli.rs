use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const DATASET: &str = r#"{
    "nodes": [
        {"id": "A", "lat": 0, "lon": 0},
        {"id": "B", "lat": 0, "lon": 1},
        {"id": "C", "lat": 1, "lon": 1},
        {"id": "D", "lat": 5, "lon": 5}
    ],
    "edges": [
        {"startId": "A", "endId": "B", "hours": [{"time": 10, "distance": 100}]},
        {"startId": "B", "endId": "C", "hours": [{"time": 5, "distance": 100}]},
        {"startId": "A", "endId": "C", "hours": [{"time": 20, "distance": 150}]},
        {"startId": "C", "endId": "D", "hours": [null, {"time": 1, "distance": 10}]}
    ]
}"#;

fn write_dataset(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("dataset.json");
    fs::write(&path, DATASET).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_isochron"))
        .args(args)
        .output()
        .expect("Failed to execute isochron")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "isochron failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn sequential_compute_reports_times_and_projection() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    let value = json(&run(&[
        "compute",
        "--dataset",
        path_str(&dataset),
        "--engine",
        "sequential",
    ]));

    let times: Vec<Value> = value["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["time_to_reach"].clone())
        .collect();
    assert_eq!(times, vec![Value::from(0.0), Value::from(10.0), Value::from(15.0), Value::Null]);
    assert!(value["nodes"][1]["display_position"]["lat"].is_f64());
    assert!(value["nodes"][3]["display_position"].is_null());
}

#[test]
fn parallel_compute_writes_frame_file() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    let output = dir.path().join("frame.json");
    let result = run(&[
        "compute",
        "--dataset",
        path_str(&dataset),
        "--hour",
        "1",
        "--mode",
        "traffic",
        "--output",
        path_str(&output),
    ]);
    assert!(result.status.success());

    let frame: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(frame["mode"], "traffic");
    assert_eq!(frame["distortion"], 1.0);
    assert_eq!(frame["nodes"].as_array().unwrap().len(), 4);
    // Only C -> D is active at hour 1, and C is unreachable from A.
    let validity: Vec<bool> = frame["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["valid"].as_bool().unwrap())
        .collect();
    assert_eq!(validity, vec![false, false, false, false]);
}

#[test]
fn split_dataset_input() {
    let dir = TempDir::new().unwrap();
    let nodes = dir.path().join("nodes.csv");
    let edges = dir.path().join("edges.json");
    fs::write(&nodes, "id,lat,lon\n1,0,0\n2,0,0.01\n").unwrap();
    fs::write(
        &edges,
        r#"{"e1": {"start_junction_id": 1, "end_junction_id": 2, "hours": [{"time": 7, "distance": 1000}]}}"#,
    )
    .unwrap();

    let value = json(&run(&[
        "compute",
        "--nodes",
        path_str(&nodes),
        "--edges",
        path_str(&edges),
        "--source",
        "1",
        "--engine",
        "sequential",
    ]));
    assert_eq!(value["nodes"][1]["time_to_reach"], 7.0);
    assert_eq!(value["nodes"][1]["hops"], 1);
}

#[test]
fn compare_agrees_within_tolerance() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    for hour in ["0", "1", "2"] {
        let output = run(&["compare", "--dataset", path_str(&dataset), "--hour", hour]);
        assert!(output.status.success(), "hour {hour}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("max relative difference"), "{stdout}");
    }
}

#[test]
fn compare_fails_when_engines_disagree() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    // One pass leaves C at the direct 20 s instead of 10 + 5 via B.
    let output = run(&[
        "compare",
        "--dataset",
        path_str(&dataset),
        "--max-passes",
        "1",
    ]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("max relative difference 2.5e-1"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exceeds tolerance 1e-6"), "{stderr}");
}

#[test]
fn animate_prints_one_line_per_pass() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    let output = run(&["animate", "--dataset", path_str(&dataset)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(!lines.is_empty());
    assert!(lines[0].contains("reached        3/4"), "{stdout}");
    assert!(lines.last().unwrap().contains("distortion 1.000"), "{stdout}");
}

#[test]
fn unknown_source_fails() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    let output = run(&["compute", "--dataset", path_str(&dataset), "--source", "Z"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown node id 'Z'"));
}

#[test]
fn dangling_edge_fails_at_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(
        &path,
        r#"{"nodes": [{"id": "A", "lat": 0, "lon": 0}], "edges": [{"startId": "A", "endId": "Q"}]}"#,
    )
    .unwrap();
    let output = run(&["compute", "--dataset", path_str(&path)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown node id 'Q'"));
}

#[test]
fn config_file_sets_pass_ceiling() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir);
    let config = dir.path().join("isochron.yaml");
    fs::write(&config, "max_passes: 1\n").unwrap();
    let value = json(&run(&[
        "compute",
        "--dataset",
        path_str(&dataset),
        "--config",
        path_str(&config),
    ]));
    assert_eq!(value["passes"], 1);
}
