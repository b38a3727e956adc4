use assert_cmd::Command;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug)]
pub struct TkRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    pub duration: Duration,
}

pub struct TkWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl TkWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        let log_dir = root.join("logs");
        fs::create_dir_all(&log_dir).expect("log dir");
        Self {
            db_path: root.join("data").join("archive.db"),
            temp_dir,
            root,
            log_dir,
        }
    }
}

/// Run `tk` against the workspace database with an isolated home.
pub fn run_tk<I, S>(workspace: &TkWorkspace, args: I, label: &str) -> TkRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tk"));
    cmd.current_dir(&workspace.root);
    cmd.arg("--db").arg(&workspace.db_path);
    cmd.args(args);
    cmd.env("NO_COLOR", "1");
    cmd.env("RUST_LOG", "threadkeep=debug");
    cmd.env("HOME", &workspace.root);
    cmd.env_remove("XDG_CONFIG_HOME");
    cmd.env_remove("XDG_DATA_HOME");

    let start = Instant::now();
    let output = cmd.output().expect("run tk");
    let duration = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_path = workspace.log_dir.join(format!("{label}.log"));
    let _ = fs::write(
        &log_path,
        format!("status: {}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}", output.status),
    );

    TkRun {
        stdout,
        stderr,
        status: output.status,
        duration,
    }
}
