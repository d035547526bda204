use crate::compiler::{check_compile, expected_diagnostic};
use crate::types::{CompileResult, ExecutionOutcome};

/// Classifies a test from its compile result and, if the program was run, its
/// expected and actual stdout.
///
/// Without a run only the diagnostic contract counts. With a run the compile must
/// have succeeded and stdout must match byte for byte.
pub fn classify(
    compile: &CompileResult,
    expected_good: bool,
    run: Option<(&str, &str)>,
) -> ExecutionOutcome {
    let verdict = check_compile(compile, expected_good);
    let (passed, stdout_expected, stdout_actual, executed) = match run {
        Some((expected, actual)) => (
            verdict.success && expected == actual,
            expected.to_string(),
            actual.to_string(),
            true,
        ),
        None => (verdict.success, String::new(), String::new(), false),
    };
    ExecutionOutcome {
        passed,
        diagnostic_expected: expected_diagnostic(expected_good).to_string(),
        diagnostic_actual: compile.diagnostic.clone(),
        stdout_expected,
        stdout_actual,
        return_code_note: verdict.return_code_note,
        executed,
    }
}
