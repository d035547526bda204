use anyhow::Result;
use clap::{Parser, error::ErrorKind};
use colored::control::set_override as set_color_override;
use jlc_tester::backend::{self, Backend};
use jlc_tester::catalog;
use jlc_tester::compiler::CompilerInvoker;
use jlc_tester::engine::run_backend;
use jlc_tester::error::FatalError;
use jlc_tester::i18n;
use jlc_tester::report::{print_human, status_line};
use jlc_tester::submission::Submission;
use jlc_tester::toolchain::Toolchain;
use jlc_tester::types::{BackendKind, CampaignResult};
use jlc_tester::workspace::Workspace;
use jlc_tester::{t, t_args};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(version, disable_version_flag = true, about = t!("cli-about"))]
struct Cli {
    #[arg(
        value_name = "SUBMISSION",
        required_unless_present = "list",
        help = t!("cli-submission")
    )]
    submission: Option<PathBuf>,

    #[arg(short = 's', value_name = "NAME", default_value = "jlc", help = t!("cli-prefix"))]
    prefix: String,

    #[arg(long, help = t!("cli-llvm"))]
    llvm: bool,

    #[arg(long, help = t!("cli-x86"))]
    x86: bool,

    #[arg(long, help = t!("cli-x64"))]
    x64: bool,

    #[arg(long, help = t!("cli-riscv"))]
    riscv: bool,

    #[arg(short = 'x', value_name = "EXT", num_args = 1.., help = t!("cli-extensions"))]
    extensions: Vec<String>,

    #[arg(long, help = t!("cli-noclean"))]
    noclean: bool,

    #[arg(long, help = t!("cli-list"))]
    list: bool,

    #[arg(long, value_name = "DIR", default_value = "testsuite", help = t!("cli-testsuite"))]
    testsuite: PathBuf,

    #[arg(long, value_name = "FILE", help = t!("cli-toolchain"))]
    toolchain: Option<PathBuf>,

    #[arg(long, value_name = "SECS", help = t!("cli-timeout"))]
    timeout: Option<u64>,

    #[arg(short = 'v', long, action = clap::ArgAction::Version, help = t!("cli-version"))]
    version: Option<bool>,

    #[arg(long, help = t!("cli-verbose"))]
    verbose: bool,

    #[arg(long = "no-color", help = t!("cli-no-color"))]
    no_color: bool,
}

impl Cli {
    fn backends(&self) -> Vec<BackendKind> {
        BackendKind::TARGETS
            .into_iter()
            .filter(|kind| match kind {
                BackendKind::Bitcode => self.llvm,
                BackendKind::X86 => self.x86,
                BackendKind::X64 => self.x64,
                BackendKind::RiscV => self.riscv,
                BackendKind::None => false,
            })
            .collect()
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_banner(prefix: &str, backends: &[BackendKind], extensions: &[String]) {
    let backends = if backends.is_empty() {
        t!("banner-no-backends")
    } else {
        backends
            .iter()
            .map(|b| b.suffix())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let extensions = if extensions.is_empty() {
        t!("banner-no-extensions")
    } else {
        extensions.join(", ")
    };
    println!("{}", t!("banner-title"));
    println!("  {}", t_args!("banner-prefix", "prefix" => prefix));
    println!("  {}", t_args!("banner-backends", "backends" => backends));
    println!("  {}", t_args!("banner-extensions", "extensions" => extensions));
    println!();
}

fn run(cli: &Cli) -> Result<bool> {
    let mut toolchain = match &cli.toolchain {
        Some(path) => Toolchain::load(path)?,
        None => Toolchain::default(),
    };
    if let Some(secs) = cli.timeout {
        toolchain.timeout_secs = secs;
    }

    if cli.list {
        println!("{}", t!("available-extensions"));
        for name in catalog::available_extensions(&cli.testsuite)? {
            println!("  * {name}");
        }
        return Ok(true);
    }

    let extensions = catalog::validate_extensions(&cli.testsuite, &cli.extensions)?;
    let backends = cli.backends();

    let Some(path) = &cli.submission else {
        return Ok(false);
    };
    let submission = Submission::open(path, &toolchain, cli.noclean)?;

    println!("- {}", t_args!("stage-contents", "path" => submission.root().display()));
    submission.check_contents()?;
    println!("- {}", t_args!("stage-build", "path" => submission.root().display()));
    submission.build(&toolchain)?;
    println!("- {}", t!("stage-executables"));
    submission.check_executables(&cli.prefix, &backends)?;

    // Runtime objects live in the scratch directory, which --noclean keeps on every exit path.
    let scratch = Workspace::create("testing_scratch_", cli.noclean)?;
    println!("- {}", t!("stage-runtimes"));
    let mut targets: Vec<Option<Box<dyn Backend>>> = Vec::new();
    if backends.is_empty() {
        targets.push(None);
    }
    for kind in &backends {
        targets.push(backend::prepare(*kind, &toolchain, &submission.lib_dir(), scratch.path())?);
    }
    println!("  {}", t!("stage-ok"));
    println!();

    let cases = catalog::discover(&cli.testsuite, &extensions)?;
    info!("discovered {} tests", cases.len());
    print_banner(&cli.prefix, &backends, &extensions);

    let mut result = CampaignResult::default();
    for target in &targets {
        let kind = target.as_ref().map_or(BackendKind::None, |b| b.kind());
        let compiler = CompilerInvoker::new(
            submission.compiler_path(&cli.prefix, kind),
            toolchain.timeout(),
        );
        let summary = run_backend(
            &compiler,
            &cases,
            target.as_deref(),
            toolchain.timeout(),
            |current, total, case| println!("{}", status_line(current, total, case)),
        );
        println!();
        result.summaries.push(summary);
    }

    print_human(&result);
    Ok(result.success())
}

fn main() -> ExitCode {
    i18n::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let kind = error.kind();
            if kind == ErrorKind::DisplayHelp || kind == ErrorKind::DisplayVersion {
                let _ = error.print();
                return ExitCode::SUCCESS;
            }
            let _ = error.print();
            return ExitCode::FAILURE;
        }
    };

    // With --verbose, show INFO and above, but allow RUST_LOG to override
    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "jlc_tester=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "jlc_tester=warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        set_color_override(false);
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<FatalError>() {
                Some(fatal) => {
                    eprintln!("\n{}\n{}", t!("fatal-failed"), indent(&fatal.to_string()));
                }
                None => eprintln!("\n{} {e:?}", t!("fatal-uncaught")),
            }
            ExitCode::FAILURE
        }
    }
}
