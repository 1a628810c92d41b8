use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::tempdir;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn manifest() -> Command {
    Command::new(env!("CARGO_BIN_EXE_manifest"))
}

#[test]
fn predict_writes_submission_and_reports_success() {
    let tmp = tempdir().expect("temporary directory");
    let output = tmp.path().join("submission.csv");

    let result = manifest()
        .current_dir(tmp.path())
        .args(["predict", demo("test.csv").to_str().expect("path str")])
        .args(["--model", demo("titanic_lr.toml").to_str().expect("path str")])
        .args(["--output", output.to_str().expect("path str")])
        .output()
        .expect("run manifest predict");

    assert!(
        result.status.success(),
        "predict failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains(&format!("File {} successfully saved", output.display())));

    let text = fs::read_to_string(&output).expect("read submission");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("PassengerId,Survived"));
    assert_eq!(lines.next(), Some("892,0"));
    assert_eq!(text.lines().count(), 15);
}

#[test]
fn missing_model_exits_nonzero_without_output() {
    let tmp = tempdir().expect("temporary directory");
    let output = tmp.path().join("submission.csv");

    let result = manifest()
        .current_dir(tmp.path())
        .args(["predict", demo("test.csv").to_str().expect("path str")])
        .args(["--model", "no_such_model.toml"])
        .args(["--output", output.to_str().expect("path str")])
        .output()
        .expect("run manifest predict");

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("no_such_model.toml"), "stderr: {stderr}");
    assert!(!output.exists());
}

#[test]
fn defective_row_policy_is_selectable() {
    let tmp = tempdir().expect("temporary directory");
    let test_path = tmp.path().join("test.csv");
    fs::write(
        &test_path,
        "PassengerId,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked\n\
1,3,\"A, Mr. B\",male,22,1,0,A/5 21171,7.25,,S\n\
2,1,\"C, Mr. D\",male,80.1,0,0,27042,30,A23,S\n",
    )
    .expect("write test data");
    let output = tmp.path().join("submission.csv");

    let run = |policy: &str| {
        manifest()
            .current_dir(tmp.path())
            .args(["predict", test_path.to_str().expect("path str")])
            .args(["--model", demo("titanic_lr.toml").to_str().expect("path str")])
            .args(["--output", output.to_str().expect("path str")])
            .args(["--on-row-defect", policy])
            .output()
            .expect("run manifest predict")
    };

    let aborted = run("abort");
    assert_eq!(aborted.status.code(), Some(1));
    assert!(!output.exists());

    let skipped = run("skip");
    assert!(skipped.status.success());
    let text = fs::read_to_string(&output).expect("read submission");
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().nth(1).expect("one row").starts_with("1,"));
}

#[test]
fn schema_lists_fields_in_order() {
    let result = manifest()
        .args(["schema", "--model", demo("titanic_lr.toml").to_str().expect("path str")])
        .output()
        .expect("run manifest schema");

    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    let pclass = stdout.find("Pclass").expect("Pclass listed");
    let embarked = stdout.find("Embarked").expect("Embarked listed");
    assert!(pclass < embarked);
    assert!(stdout.contains("Target: Survived"));
}
