//! Run-directory fixtures for unit tests

use crate::git::GitQuery;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// `git` that knows nothing
#[derive(Debug)]
pub struct NoGit;

impl GitQuery for NoGit {
    fn query(&self, _args: &[&str]) -> String {
        String::new()
    }
}

/// Builder for an on-disk run directory
#[derive(Debug, Clone)]
pub struct RunFixture {
    dir_name: String,
    command_type: String,
    command: String,
    exit_code: String,
    stdout: String,
    run_name: Option<String>,
    env: Option<String>,
    kernels: Vec<(String, String)>,
    ptx: Vec<(String, String)>,
}

impl RunFixture {
    pub fn new(command_type: &str) -> Self {
        Self {
            dir_name: "run".to_string(),
            command_type: command_type.to_string(),
            command: "test_nvfuser --gtest_filter=*\n".to_string(),
            exit_code: "0\n".to_string(),
            stdout: String::new(),
            run_name: None,
            env: None,
            kernels: Vec::new(),
            ptx: Vec::new(),
        }
    }

    pub fn dir_name(mut self, name: &str) -> Self {
        self.dir_name = name.to_string();
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code.to_string();
        self
    }

    pub fn stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn run_name(mut self, name: &str) -> Self {
        self.run_name = Some(name.to_string());
        self
    }

    pub fn env(mut self, env: &str) -> Self {
        self.env = Some(env.to_string());
        self
    }

    pub fn kernel(mut self, filename: &str, source: &str) -> Self {
        self.kernels.push((filename.to_string(), source.to_string()));
        self
    }

    pub fn ptx(mut self, filename: &str, text: &str) -> Self {
        self.ptx.push((filename.to_string(), text.to_string()));
        self
    }
}

/// Write `fixture` under `root`, returning the run directory
#[allow(clippy::unwrap_used)]
pub fn write_run(root: &Path, fixture: &RunFixture) -> PathBuf {
    let dir = root.join(&fixture.dir_name);
    fs::create_dir_all(dir.join("cuda")).unwrap();
    fs::write(dir.join("git_hash"), "0123456789abcdef\n").unwrap();
    fs::write(dir.join("command"), &fixture.command).unwrap();
    fs::write(dir.join("command_type"), &fixture.command_type).unwrap();
    fs::write(dir.join("exitcode"), &fixture.exit_code).unwrap();
    fs::write(dir.join("stdout"), &fixture.stdout).unwrap();
    fs::write(dir.join("gpu_names"), "NVIDIA H100\n").unwrap();
    if let Some(name) = &fixture.run_name {
        fs::write(dir.join("run_name"), name).unwrap();
    }
    if let Some(env) = &fixture.env {
        fs::write(dir.join("env"), env).unwrap();
    }
    for (name, source) in &fixture.kernels {
        fs::write(dir.join("cuda").join(name), source).unwrap();
    }
    if !fixture.ptx.is_empty() {
        fs::create_dir_all(dir.join("ptx")).unwrap();
        for (name, text) in &fixture.ptx {
            fs::write(dir.join("ptx").join(name), text).unwrap();
        }
    }
    dir
}

/// Shared buffer the test subscriber writes formatted events into
#[derive(Debug, Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    #[allow(clippy::unwrap_used)]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber, returning the plain-text log it produced
#[allow(clippy::unwrap_used)]
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
