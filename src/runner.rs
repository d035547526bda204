use crate::error::ToolError;
use crate::toolchain::{self, Input};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Runs a linked test program and returns what it printed.
///
/// `launcher` is prepended to the command line (an emulator for cross-compiled
/// targets). The program reads `input` when given, otherwise an empty stdin.
/// Its exit status is not part of the verdict.
pub fn run_program(
    exe: &Path,
    launcher: &[OsString],
    input: Option<&Path>,
    timeout: Duration,
) -> Result<String, ToolError> {
    let mut cmd = match launcher.split_first() {
        Some((program, rest)) => {
            let mut cmd = Command::new(program);
            cmd.args(rest).arg(exe);
            cmd
        }
        None => Command::new(exe),
    };
    let name = exe.display().to_string();
    let stdin = input.map_or(Input::Empty, Input::File);
    let out = toolchain::run(&mut cmd, &name, stdin, timeout)?;
    Ok(out.stdout_lossy())
}
