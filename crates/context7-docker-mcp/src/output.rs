//! Coloured terminal lines. Everything goes to stderr; stdout is kept for
//! JSON and spawn-command output.

use context7_docker::RegistrationStatus;

use crate::types::ToolDefinition;
use crate::verify::VerificationReport;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Pass,
    Fail,
    Note,
}

impl Mark {
    fn glyph(&self) -> String {
        match self {
            Mark::Pass => format!("{GREEN}\u{2713}{RESET}"),
            Mark::Fail => format!("{RED}\u{2717}{RESET}"),
            Mark::Note => format!("{CYAN}\u{2022}{RESET}"),
        }
    }
}

pub fn line(mark: Mark, message: &str) -> String {
    format!("  {} {message}", mark.glyph())
}

pub fn success(message: &str) {
    eprintln!("{}", line(Mark::Pass, message));
}

pub fn failure(message: &str) {
    eprintln!("{}", line(Mark::Fail, message));
}

pub fn note(message: &str) {
    eprintln!("{}", line(Mark::Note, message));
}

pub fn report_lines(report: &VerificationReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.checks.len() + report.skipped.len() + 1);

    for check in &report.checks {
        let mark = if check.passed { Mark::Pass } else { Mark::Fail };
        lines.push(line(
            mark,
            &format!(
                "{:<36} {GRAY}{} ({} ms){RESET}",
                check.name, check.detail, check.elapsed_ms
            ),
        ));
    }
    for name in &report.skipped {
        lines.push(line(Mark::Note, &format!("{name:<36} {GRAY}skipped{RESET}")));
    }

    let passed = report.checks.iter().filter(|c| c.passed).count();
    let summary = format!(
        "{BOLD}suite '{}'{RESET}: {passed}/{} checks passed",
        report.suite,
        report.checks.len() + report.skipped.len()
    );
    lines.push(line(if report.passed { Mark::Pass } else { Mark::Fail }, &summary));
    lines
}

pub fn print_report(report: &VerificationReport) {
    eprintln!();
    for text in report_lines(report) {
        eprintln!("{text}");
    }
    eprintln!();
}

pub fn status_line(status: &RegistrationStatus) -> String {
    match (status.present, status.connected) {
        (false, _) => line(Mark::Note, &format!("{}: not registered", status.name)),
        (true, true) => line(Mark::Pass, &format!("{}: connected", status.name)),
        (true, false) => line(Mark::Fail, &format!("{}: registered, not connected", status.name)),
    }
}

pub fn print_tools(tools: &[ToolDefinition]) {
    eprintln!();
    eprintln!("  {} tools advertised:", tools.len());
    eprintln!();
    for tool in tools {
        eprintln!(
            "    {:<28} {}",
            tool.name,
            first_line(tool.description.as_deref().unwrap_or(""))
        );
    }
    eprintln!();
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
