//! Run the `track_task` binary against a SQLite registry.

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use tempfile::TempDir;

use gleam_x::{db::Observation, make_db, DbConfig, Registry, TaskKey, TaskStatus};

const OBS_ID: i64 = 1090008640;

/// Make a registry holding one observation.
fn setup() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gleam_x.sqlite");
    let mut registry = make_db(&DbConfig::Sqlite { path: path.clone() }, false).unwrap();
    registry
        .insert_observation(&Observation {
            obs_id: OBS_ID,
            status: Some("unprocessed".to_string()),
            ..Default::default()
        })
        .unwrap();
    (dir, path)
}

fn open(path: &Path) -> Registry {
    gleam_x::connect(&DbConfig::Sqlite {
        path: path.to_path_buf(),
    })
    .unwrap()
}

fn track_task(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("track_task").unwrap();
    cmd.env_remove("GXDBCONFIG")
        .env_remove("GXDBHOST")
        .env("GXTRACK", "track")
        .env("GXDBFILE", db)
        .env("GXUSER", "gleamer")
        .env("GXCLUSTER", "setonix");
    cmd
}

/// The exit code, stdout and stderr of a finished command.
fn get_cmd_output(result: Result<Output, OutputError>) -> (Option<i32>, String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        output.status.code(),
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

fn key(job_id: i64) -> TaskKey {
    TaskKey {
        job_id,
        task_id: 1,
        host_cluster: "setonix".to_string(),
    }
}

#[test]
fn test_tracking_disabled() {
    let (_dir, db) = setup();
    let cmd = track_task(&db)
        .env_remove("GXTRACK")
        .args(["queue", "--jobid", "1"])
        .ok();
    let (code, stdout, _) = get_cmd_output(cmd);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Task process tracking is disabled."), "{stdout}");

    let cmd = track_task(&db)
        .env("GXTRACK", "no-track")
        .args(["start", "--jobid", "1", "--taskid", "1", "--start_time", "10"])
        .ok();
    let (code, stdout, _) = get_cmd_output(cmd);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Task process tracking is disabled."), "{stdout}");
    assert!(open(&db).get_task(&key(1)).unwrap().is_none());
}

#[test]
fn test_task_lifecycle() {
    let (_dir, db) = setup();
    let cmd = track_task(&db)
        .args([
            "queue",
            "--jobid",
            "1234",
            "--taskid",
            "1",
            "--submission_time",
            "1600000000",
            "--obs_id",
            "1090008640",
            "--batch_file",
            "calibrate_1090008640.sh",
            "--stderr",
            "calibrate.e1234",
            "--stdout",
            "calibrate.o1234",
            "--task",
            "calibrate",
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);
    let task = open(&db).get_task(&key(1234)).unwrap().unwrap();
    assert_eq!(task.status.as_deref(), Some("queued"));
    assert_eq!(task.user.as_deref(), Some("gleamer"));
    assert_eq!(task.submission_time, Some(1600000000));

    let cmd = track_task(&db)
        .args(["start", "--jobid", "1234", "--taskid", "1", "--start_time", "1600000100"])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);
    let task = open(&db).get_task(&key(1234)).unwrap().unwrap();
    assert_eq!(task.status.as_deref(), Some("started"));
    assert_eq!(task.start_time, Some(1600000100));

    let cmd = track_task(&db)
        .args(["FINISH", "--jobid", "1234", "--taskid", "1", "--finish_time", "now"])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);
    let task = open(&db).get_task(&key(1234)).unwrap().unwrap();
    let finished: &'static str = TaskStatus::Finished.into();
    assert_eq!(task.status.as_deref(), Some(finished));
    assert!(task.end_time.unwrap() > 1600000100);
}

#[test]
fn test_obs_status() {
    let (_dir, db) = setup();
    let cmd = track_task(&db)
        .args(["obs_status", "--obs_id", "1090008640", "--status", "Calibrated"])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);
    let obs = open(&db).get_observation(OBS_ID).unwrap().unwrap();
    assert_eq!(obs.status.as_deref(), Some("calibrated"));

    let cmd = track_task(&db)
        .args(["obs_status", "--obs_id", "1090008640", "--status", "bogus"])
        .ok();
    let (code, _, stderr) = get_cmd_output(cmd);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("not in the allowed list"), "{stderr}");
    let obs = open(&db).get_observation(OBS_ID).unwrap().unwrap();
    assert_eq!(obs.status.as_deref(), Some("calibrated"));
}

#[test]
fn test_missing_argument() {
    let (_dir, db) = setup();
    let cmd = track_task(&db)
        .args(["start", "--jobid", "1234", "--taskid", "1"])
        .ok();
    let (code, _, stderr) = get_cmd_output(cmd);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Directive start requires argument start_time"), "{stderr}");

    let cmd = track_task(&db)
        .env_remove("GXCLUSTER")
        .env_remove("HOST_CLUSTER")
        .env_remove("HOST")
        .args(["fail", "--jobid", "1234", "--taskid", "1", "--finish_time", "10"])
        .ok();
    let (code, _, stderr) = get_cmd_output(cmd);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Directive fail requires argument host_cluster"), "{stderr}");
}

#[test]
fn test_unknown_directive() {
    let (_dir, db) = setup();
    let cmd = track_task(&db)
        .arg("restart")
        .ok();
    let (code, _, stderr) = get_cmd_output(cmd);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("queue_mosaic"), "{stderr}");
}

#[test]
fn test_mosaic_lifecycle() {
    let (_dir, db) = setup();
    open(&db)
        .insert_observation(&Observation {
            obs_id: OBS_ID + 120,
            ..Default::default()
        })
        .unwrap();

    let cmd = track_task(&db)
        .args([
            "queue_mosaic",
            "--jobid",
            "99",
            "--taskid",
            "1",
            "--submission_time",
            "1600000000",
            "--subband",
            "170-231MHz",
            "--batch_obs_ids",
            "1090008640",
            "1090008760",
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);
    let cmd = track_task(&db)
        .args([
            "start_mosaic",
            "--jobid",
            "99",
            "--taskid",
            "1",
            "--subband",
            "170-231MHz",
            "--start_time",
            "1600000100",
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).2);

    let rows = open(&db).mosaic_tasks(&key(99), "170-231MHz").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r.status.as_deref() == Some("started") && r.start_time == Some(1600000100)));

    let cmd = track_task(&db)
        .args([
            "queue_mosaic",
            "--jobid",
            "100",
            "--taskid",
            "1",
            "--submission_time",
            "1600000000",
            "--subband",
            "170-231MHz",
        ])
        .ok();
    let (code, _, stderr) = get_cmd_output(cmd);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("requires argument batch_obs_ids"), "{stderr}");
}
