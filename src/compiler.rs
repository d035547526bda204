use crate::error::ToolError;
use crate::toolchain::{self, Input};
use crate::types::{CompileResult, DIAG_ERROR, DIAG_OK, TestCase};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// The compiler under test. It reads the program on stdin and reports on stderr.
#[derive(Debug, Clone)]
pub struct CompilerInvoker {
    pub exe: PathBuf,
    pub timeout: Duration,
}

/// Whether a compile run honoured the contract for a good or a bad test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileVerdict {
    pub success: bool,
    pub return_code_note: Option<String>,
}

pub fn expected_diagnostic(expected_good: bool) -> &'static str {
    if expected_good { DIAG_OK } else { DIAG_ERROR }
}

/// Good programs need exactly `OK` and exit 0; bad ones need an `ERROR` message and a non-zero exit.
pub fn check_compile(result: &CompileResult, expected_good: bool) -> CompileVerdict {
    if expected_good {
        CompileVerdict {
            success: result.diagnostic == DIAG_OK && result.exit_code == 0,
            return_code_note: (result.exit_code != 0).then(|| {
                format!("compiler return code: {}, 0 expected", result.exit_code)
            }),
        }
    } else {
        CompileVerdict {
            success: result.diagnostic.contains(DIAG_ERROR) && result.exit_code != 0,
            return_code_note: (result.exit_code == 0)
                .then(|| "compiler return code: 0, nonzero expected".to_string()),
        }
    }
}

impl CompilerInvoker {
    pub fn new(exe: impl Into<PathBuf>, timeout: Duration) -> Self {
        CompilerInvoker {
            exe: exe.into(),
            timeout,
        }
    }

    pub fn name(&self) -> String {
        self.exe.display().to_string()
    }

    pub fn compile_file(&self, source: &Path) -> Result<CompileResult, ToolError> {
        let mut cmd = Command::new(&self.exe);
        let out = toolchain::run(&mut cmd, &self.name(), Input::File(source), self.timeout)?;
        Ok(CompileResult {
            diagnostic: out.stderr_lossy().trim().to_string(),
            program_text: out.stdout_lossy(),
            exit_code: out.code(),
        })
    }

    pub fn compile(&self, case: &TestCase) -> Result<CompileResult, ToolError> {
        self.compile_file(&case.source_path())
    }
}
