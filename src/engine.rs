use crate::backend::Backend;
use crate::classify::classify;
use crate::compiler::{CompilerInvoker, check_compile};
use crate::error::ToolError;
use crate::runner::run_program;
use crate::types::{BackendKind, CaseResult, ExecutionOutcome, Summary, TestCase};
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

/// Compiles one test and, for a good test with a backend, links and runs it.
///
/// Linking and running only happen when the compile step met the contract, the
/// test is expected to compile and a backend is selected.
pub fn exec_test(
    compiler: &CompilerInvoker,
    case: &TestCase,
    backend: Option<&dyn Backend>,
    timeout: Duration,
) -> Result<ExecutionOutcome, ToolError> {
    let compile = compiler.compile(case)?;

    let backend = match backend {
        Some(b) if case.expected_good && check_compile(&compile, true).success => b,
        _ => return Ok(classify(&compile, case.expected_good, None)),
    };

    let exe = backend.assemble_and_link(&compile.program_text)?;
    let launcher = backend.launcher()?;

    let expected = if case.has_output_file {
        let path = case.output_path();
        fs::read_to_string(&path)
            .map_err(|e| ToolError::io(format!("reading {}", path.display()), e))?
    } else {
        String::new()
    };
    let input = case.has_input_file.then(|| case.input_path());
    let actual = run_program(&exe, &launcher, input.as_deref(), timeout)?;

    Ok(classify(&compile, case.expected_good, Some((&expected, &actual))))
}

/// Runs every case against one backend (or type checking only), in order.
///
/// A failing or erroring test is recorded and the loop continues. `on_result`
/// sees each result with its 1-based position and the total.
pub fn run_backend<F>(
    compiler: &CompilerInvoker,
    cases: &[TestCase],
    backend: Option<&dyn Backend>,
    timeout: Duration,
    mut on_result: F,
) -> Summary
where
    F: FnMut(usize, usize, &CaseResult),
{
    let kind = backend.map_or(BackendKind::None, |b| b.kind());
    info!("running {} tests for backend {kind}", cases.len());

    let mut summary = Summary::new(kind);
    for (idx, case) in cases.iter().enumerate() {
        let result = match exec_test(compiler, case, backend, timeout) {
            Ok(outcome) => CaseResult {
                identity: case.identity.clone(),
                backend: kind,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                warn!("{}: {e}", case.identity);
                CaseResult {
                    identity: case.identity.clone(),
                    backend: kind,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        };
        on_result(idx + 1, cases.len(), &result);
        summary.record(result);
    }

    info!(
        "backend {kind} finished: {} passed, {} failed, {} exceptions",
        summary.passed, summary.failed, summary.exceptions
    );
    summary
}
