use std::fmt;
use std::path::PathBuf;

/// Extension of Javalette source files.
pub const SOURCE_EXT: &str = "jl";
pub const INPUT_EXT: &str = "input";
pub const OUTPUT_EXT: &str = "output";

/// Diagnostic a compiler must print for an accepted program.
pub const DIAG_OK: &str = "OK";
/// Substring a compiler must print for a rejected program.
pub const DIAG_ERROR: &str = "ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Type check only, nothing is linked or executed.
    None,
    Bitcode,
    X86,
    X64,
    RiscV,
}

impl BackendKind {
    /// Every backend that produces an executable, in campaign order.
    pub const TARGETS: [BackendKind; 4] = [
        BackendKind::Bitcode,
        BackendKind::X86,
        BackendKind::X64,
        BackendKind::RiscV,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            BackendKind::None => "none",
            BackendKind::Bitcode => "llvm",
            BackendKind::X86 => "x86",
            BackendKind::X64 => "x64",
            BackendKind::RiscV => "riscv",
        }
    }

    /// Name of the compiler executable the submission must build for this backend.
    pub fn executable_name(self, prefix: &str) -> String {
        match self {
            BackendKind::None | BackendKind::Bitcode => prefix.to_string(),
            other => format!("{prefix}_{}", other.suffix()),
        }
    }

    pub fn links(self) -> bool {
        self != BackendKind::None
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Path of the test without extension, e.g. `testsuite/good/core001`.
    pub identity: String,
    pub expected_good: bool,
    pub has_input_file: bool,
    pub has_output_file: bool,
}

impl TestCase {
    /// Builds a case from its identity, probing the sibling `.input`/`.output` files.
    pub fn new(identity: impl Into<String>, expected_good: bool) -> Self {
        let identity = identity.into();
        let mut case = TestCase {
            identity,
            expected_good,
            has_input_file: false,
            has_output_file: false,
        };
        case.has_input_file = case.input_path().is_file();
        case.has_output_file = case.output_path().is_file();
        case
    }

    fn with_ext(&self, ext: &str) -> PathBuf {
        PathBuf::from(format!("{}.{ext}", self.identity))
    }

    pub fn source_path(&self) -> PathBuf {
        self.with_ext(SOURCE_EXT)
    }

    pub fn input_path(&self) -> PathBuf {
        self.with_ext(INPUT_EXT)
    }

    pub fn output_path(&self) -> PathBuf {
        self.with_ext(OUTPUT_EXT)
    }

    pub fn display_name(&self) -> String {
        format!("{}.{SOURCE_EXT}", self.identity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    /// Trimmed standard error of the compiler.
    pub diagnostic: String,
    /// Standard output of the compiler, the program handed to the backend.
    pub program_text: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub passed: bool,
    pub diagnostic_expected: String,
    pub diagnostic_actual: String,
    pub stdout_expected: String,
    pub stdout_actual: String,
    pub return_code_note: Option<String>,
    /// Whether the program was linked and run, i.e. whether stdout fields are meaningful.
    pub executed: bool,
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub identity: String,
    pub backend: BackendKind,
    pub outcome: Option<ExecutionOutcome>,
    pub error: Option<String>,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().is_some_and(|o| o.passed)
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub backend: BackendKind,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub exceptions: usize,
    pub cases: Vec<CaseResult>,
}

impl Summary {
    pub fn new(backend: BackendKind) -> Self {
        Summary {
            backend,
            total: 0,
            passed: 0,
            failed: 0,
            exceptions: 0,
            cases: Vec::new(),
        }
    }

    pub fn record(&mut self, result: CaseResult) {
        self.total += 1;
        if result.error.is_some() {
            self.exceptions += 1;
        } else if result.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.cases.push(result);
    }
}

/// Every backend's summary, in the order the backends ran.
#[derive(Debug, Clone, Default)]
pub struct CampaignResult {
    pub summaries: Vec<Summary>,
}

impl CampaignResult {
    pub fn failures(&self) -> impl Iterator<Item = (&CaseResult, &ExecutionOutcome)> {
        self.summaries
            .iter()
            .flat_map(|s| s.cases.iter())
            .filter(|c| c.error.is_none())
            .filter_map(|c| c.outcome.as_ref().filter(|o| !o.passed).map(|o| (c, o)))
    }

    pub fn exceptions(&self) -> impl Iterator<Item = (&CaseResult, &str)> {
        self.summaries
            .iter()
            .flat_map(|s| s.cases.iter())
            .filter_map(|c| c.error.as_deref().map(|e| (c, e)))
    }

    pub fn total(&self) -> usize {
        self.summaries.iter().map(|s| s.total).sum()
    }

    pub fn passed(&self) -> usize {
        self.summaries.iter().map(|s| s.passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.summaries.iter().map(|s| s.failed).sum()
    }

    pub fn exception_count(&self) -> usize {
        self.summaries.iter().map(|s| s.exceptions).sum()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0 && self.exception_count() == 0
    }
}
