use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn zcad() -> Command {
    let mut cmd = Command::cargo_bin("zcad").expect("binary is built");
    cmd.env_remove("ZCAD_CONFIG");
    cmd
}

#[test]
fn demo_runs_without_arguments() {
    zcad()
        .assert()
        .success()
        .stdout(predicate::str::contains("> tan_circle @0 @1 @2 1 1 1"))
        .stdout(predicate::str::contains("文档: 7 个实体"))
        .stdout(predicate::str::contains("  circle: 4"))
        .stdout(predicate::str::contains("center (0.0000, 0.0000)"));
}

#[test]
fn inline_commands_and_snapshot() {
    zcad()
        .args(["-c", "circle 0,0 5", "-c", "line 0,0 10,0", "--snapshot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("文档: 2 个实体"))
        .stdout(predicate::str::contains("\"kind\": \"circle\""))
        .stdout(predicate::str::contains("\"radius\": 5.0"));
}

#[test]
fn script_file_is_executed_line_by_line() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "# 注释").unwrap();
    writeln!(script, "point 1,1").unwrap();
    writeln!(script).unwrap();
    writeln!(script, "point 2,2").unwrap();
    writeln!(script, "undo").unwrap();

    zcad()
        .arg("--script")
        .arg(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("文档: 1 个实体"))
        .stdout(predicate::str::contains("撤销: 1 / 重做: 1"));
}

#[test]
fn failing_command_reports_line_and_exits_non_zero() {
    zcad()
        .args(["-c", "circle 0,0 1", "-c", "explode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("第 2 行 `explode` 执行失败"))
        .stderr(predicate::str::contains("unknown command `explode`"));
}

#[test]
fn explicit_config_is_applied() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config,
        r#"
        [snap]
        threshold = 0.1

        [history]
        limit = 1
        "#
    )
    .unwrap();

    zcad()
        .arg("--config")
        .arg(config.path())
        .args(["-c", "point 0,0", "-c", "point 5,5", "-c", "snap 1,1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("none (1.0000, 1.0000)"))
        .stdout(predicate::str::contains("撤销: 1 / 重做: 0"));
}

#[test]
fn invalid_config_is_fatal() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "[geometry]\ntolerance = -1.0").unwrap();

    zcad()
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("geometry.tolerance"));
}
