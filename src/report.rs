use crate::types::{CampaignResult, CaseResult, ExecutionOutcome};
use crate::{t, t_args};
use colored::Colorize;

fn indent_with(spaces: usize, text: &str) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|l| format!("{pad}{l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn failure_banner(case: &CaseResult) -> String {
    t_args!("report-failed-banner", "name" => case.identity, "backend" => case.backend)
}

/// One progress line, e.g. `[  3/ 57] testsuite/good/core003 ... OK`.
pub fn status_line(current: usize, total: usize, case: &CaseResult) -> String {
    let verdict = if case.passed() {
        t!("status-ok").green().to_string()
    } else {
        t!("status-failed").red().bold().to_string()
    };
    format!("[{current:3}/{total:3}] {:25} ... {verdict}", case.identity)
}

fn push_section(out: &mut String, key: &str, text: &str) {
    out.push_str(&format!("{}\n", t!(key).bold()));
    out.push_str(&indent_with(4, text));
    out.push('\n');
}

fn render_failure(out: &mut String, case: &CaseResult, outcome: &ExecutionOutcome) {
    out.push_str(&failure_banner(case).red().bold().to_string());
    out.push_str("\n\n");
    if outcome.diagnostic_expected != outcome.diagnostic_actual {
        push_section(out, "report-stderr-expected", &outcome.diagnostic_expected);
        push_section(out, "report-stderr-actual", &outcome.diagnostic_actual);
    }
    if let Some(note) = &outcome.return_code_note {
        push_section(out, "report-return-code", note);
    }
    if outcome.executed && outcome.stdout_expected != outcome.stdout_actual {
        push_section(out, "report-stdout-expected", &outcome.stdout_expected);
        push_section(out, "report-stdout-actual", &outcome.stdout_actual);
    }
    out.push('\n');
}

pub fn render_human(result: &CampaignResult) -> String {
    let mut out = String::new();
    for s in &result.summaries {
        let failed = if s.failed > 0 {
            s.failed.to_string().red().bold()
        } else {
            s.failed.to_string().green()
        };
        let exceptions = if s.exceptions > 0 {
            s.exceptions.to_string().red().bold()
        } else {
            s.exceptions.to_string().green()
        };
        out.push_str(&t_args!(
            "report-backend",
            "backend" => s.backend.to_string().bold(),
            "total" => s.total,
            "passed" => s.passed.to_string().green(),
            "failed" => failed,
            "exceptions" => exceptions
        ));
        out.push('\n');
    }
    out.push('\n');

    if result.success() {
        out.push_str(&format!("{}\n", t!("report-success").green().bold()));
        return out;
    }

    let mut failures = result.failures().peekable();
    if failures.peek().is_some() {
        out.push_str(&format!("{}\n", t!("report-failures").red().bold()));
        for (case, outcome) in failures {
            render_failure(&mut out, case, outcome);
        }
    }

    let mut exceptions = result.exceptions().peekable();
    if exceptions.peek().is_some() {
        out.push_str(&format!("{}\n", t!("report-exceptions").red().bold()));
        for (case, msg) in exceptions {
            out.push_str(&failure_banner(case).red().bold().to_string());
            out.push_str("\n\n");
            out.push_str(&indent_with(4, msg));
            out.push_str("\n\n");
        }
    }
    out
}

pub fn print_human(result: &CampaignResult) {
    print!("{}", render_human(result));
}
