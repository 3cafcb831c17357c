use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const TRACE_HEADER: &str =
    "t_min,bg,delta,short_avg_delta,long_avg_delta,iob,cob,activity,predicted_bg,eventual_bg,carbs_g";

// Minimal valid config: only the sections a user would typically override.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[profile]
target_bg = 110.0
min_bg = 100.0
max_basal_uph = 3.0
current_basal_uph = 1.0
carb_ratio = 10.0
isf = 50.0

[preferences]
max_smb_u = 1.0
max_iob_u = 6.0

[logging]
level = "warn"
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_trace(dir: &tempfile::TempDir, rows: &[&str]) -> PathBuf {
    let path = dir.path().join("trace.csv");
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "{TRACE_HEADER}").unwrap();
    for r in rows {
        writeln!(f, "{r}").unwrap();
    }
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["decide", "--bg", "65"], 0, "safety_halt", "stdout")]
#[case(&["decide"], 2, "required", "stderr")]
#[case(&["decide", "--bg", "120", "--meal", "lunch"], 2, "meal-elapsed-min", "stderr")]
#[case(&["replay"], 2, "--trace", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("aid").unwrap();

    // Always include a valid config to avoid relying on defaults
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[smb]\ninterval_min = -1.0\n", "smb.interval_min")]
#[case("[profile\ntarget_bg = 110\n", "Invalid configuration")]
#[case("[sensor]\nstale_after_min = \"soon\"\n", "Invalid configuration")]
fn bad_config_exits_with_config_code(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, body).unwrap();

    Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn cli_reports_bad_trace_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bad = dir.path().join("trace.csv");
    let mut f = fs::File::create(&bad).unwrap();
    writeln!(f, "t,bg").unwrap();
    writeln!(f, "0,120").unwrap();

    Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&bad)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("must have headers"));
}

#[test]
fn non_increasing_trace_time_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let trace = write_trace(
        &dir,
        &["0,120,1,1,1,0.5,0,0.2,125,130,", "0,121,1,1,1,0.5,0,0.2,125,130,"],
    );

    Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("must increase"));
}

#[test]
fn replay_prints_one_line_per_row_and_a_summary() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let trace = write_trace(
        &dir,
        &[
            "0,120,1,1,1,0.5,0,0.2,125,130,",
            "5,118,-2,-1,0,0.5,0,0.2,115,112,",
            "10,60,-6,-5,-3,0.5,0,0.2,50,45,",
        ],
    );

    Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("t=   10.0 min"))
        .stdout(predicate::str::contains("safety_halt"))
        .stdout(predicate::str::contains("3 cycles"));
}

#[test]
fn replay_json_lines_parse() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let trace = write_trace(
        &dir,
        &[
            "0,120,1,1,1,0.5,0,0.2,125,130,",
            "5,126,6,4,2,0.5,0,0.2,150,170,45",
        ],
    );

    let out = Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("each stdout line is JSON"))
        .collect();
    assert_eq!(lines.len(), 3);
    for d in &lines[..2] {
        assert!(d["source"].is_string());
        assert!(d["bolus_u"].as_f64().unwrap() >= 0.0);
        assert!(d["basal_uph"].as_f64().unwrap() <= 3.0 + 1e-9);
        assert!(d["trail"].as_array().is_some_and(|t| !t.is_empty()));
    }
    assert_eq!(lines[0]["t_min"].as_f64(), Some(0.0));
    assert_eq!(lines[2]["summary"]["cycles"].as_u64(), Some(2));
}

#[test]
fn json_errors_go_to_stdout_with_reason() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let bad = dir.path().join("trace.csv");
    fs::write(&bad, "t,bg\n0,120\n").unwrap();

    let out = Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("replay")
        .arg("--trace")
        .arg(&bad)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(4));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["reason"], "InvalidTrace");
    assert_eq!(v["exit_code"], 4);
}

#[test]
fn decide_json_low_bg_halts_everything() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("aid")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["decide", "--bg", "65", "--delta", "-4"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["source"], "safety_halt");
    assert_eq!(v["bolus_u"].as_f64(), Some(0.0));
    assert_eq!(v["basal_uph"].as_f64(), Some(0.0));
}
