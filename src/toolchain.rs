use crate::error::{FatalError, ToolError};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// 30 seconds per compiler, assembler, linker or program invocation
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Building a submission is allowed to take much longer.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

/// Names of the external programs the harness drives, overridable from a YAML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Toolchain {
    pub llvm_as: String,
    pub llvm_link: String,
    pub clang: String,
    pub nasm: String,
    pub riscv_gcc: String,
    pub emulator: String,
    pub proxy_kernel: String,
    pub make: String,
    pub tar: String,
    pub timeout_secs: u64,
    pub build_timeout_secs: u64,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            llvm_as: "llvm-as".into(),
            llvm_link: "llvm-link".into(),
            clang: "clang".into(),
            nasm: "nasm".into(),
            riscv_gcc: "riscv64-none-elf-gcc".into(),
            emulator: "spike".into(),
            proxy_kernel: "pk".into(),
            make: "make".into(),
            tar: "tar".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
        }
    }
}

impl Toolchain {
    pub fn load(path: &Path) -> Result<Self, FatalError> {
        let content = fs::read_to_string(path)
            .map_err(|e| FatalError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&content).map_err(|message| FatalError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Toolchain::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

/// What a child process reads on standard input.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Empty,
    Bytes(&'a [u8]),
    File(&'a Path),
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit code, with termination by signal reported as -1.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(
    handle: Option<JoinHandle<io::Result<Vec<u8>>>>,
    tool: &str,
    stream: &str,
) -> Result<Vec<u8>, ToolError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("reader thread panicked")))
        .map_err(|e| ToolError::io(format!("reading the {stream} of {tool}"), e))
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs `cmd` to completion, capturing stdout and stderr, and kills it once `timeout` expires.
///
/// The exit status is returned as is; use [`run_checked`] when a non-zero exit is an error.
pub fn run(
    cmd: &mut Command,
    tool: &str,
    input: Input<'_>,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    debug!("running {:?}", cmd);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let feed = match input {
        Input::Empty => {
            cmd.stdin(Stdio::null());
            None
        }
        Input::File(path) => {
            let file = File::open(path)
                .map_err(|e| ToolError::io(format!("opening {}", path.display()), e))?;
            cmd.stdin(Stdio::from(file));
            None
        }
        Input::Bytes(bytes) => {
            cmd.stdin(Stdio::piped());
            Some(bytes.to_vec())
        }
    };

    let mut child = cmd.spawn().map_err(|source| ToolError::Launch {
        tool: tool.to_string(),
        source,
    })?;

    // The child may exit without reading everything, so a broken pipe is not an error here.
    let writer = match (feed, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => Some(thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        })),
        _ => None,
    };
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            stop(&mut child);
            return Err(ToolError::TimedOut {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
        Err(e) => {
            stop(&mut child);
            return Err(ToolError::io(format!("waiting for {tool}"), e));
        }
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }

    Ok(ToolOutput {
        status,
        stdout: collect(stdout, tool, "stdout")?,
        stderr: collect(stderr, tool, "stderr")?,
    })
}

/// Like [`run`], but a non-zero exit becomes [`ToolError::Failed`] carrying the tool's stderr.
pub fn run_checked(
    cmd: &mut Command,
    tool: &str,
    input: Input<'_>,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let out = run(cmd, tool, input, timeout)?;
    if !out.status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            stderr: out.stderr_lossy(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Toolchain::parse("").unwrap(), Toolchain::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let tc = Toolchain::parse("riscv-gcc: riscv64-unknown-elf-gcc\ntimeout-secs: 5\n").unwrap();
        assert_eq!(tc.riscv_gcc, "riscv64-unknown-elf-gcc");
        assert_eq!(tc.timeout(), Duration::from_secs(5));
        assert_eq!(tc.clang, "clang");
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Toolchain::parse("assembler: as\n").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn feeds_stdin_and_captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("cat; echo oops >&2; exit 3");
        let out = run(&mut cmd, "sh", Input::Bytes(b"hello\n"), Duration::from_secs(10)).unwrap();
        assert_eq!(out.stdout_lossy(), "hello\n");
        assert_eq!(out.stderr_lossy(), "oops\n");
        assert_eq!(out.code(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn checked_run_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 1");
        let err = run_checked(&mut cmd, "sh", Input::Empty, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, ToolError::Failed { ref stderr, .. } if stderr == "broken\n"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_child_is_killed() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let err = run(&mut cmd, "sleep", Input::Empty, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }

    struct Unreadable;

    impl Read for Unreadable {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device gone"))
        }
    }

    #[test]
    fn unreadable_stream_is_an_error() {
        let err = collect(drain(Some(Unreadable)), "jlc", "stdout").unwrap_err();
        assert!(matches!(err, ToolError::Io { ref what, .. } if what == "reading the stdout of jlc"));
        assert!(collect(drain(Some(&b"fine"[..])), "jlc", "stdout").is_ok());
        assert!(collect(None::<JoinHandle<io::Result<Vec<u8>>>>, "jlc", "stderr").unwrap().is_empty());
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let mut cmd = Command::new("definitely-not-a-real-tool-4711");
        let err = run(&mut cmd, "x", Input::Empty, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::Launch { .. }));
    }
}
