// Result and diagnostic rendering for `folio` commands.
//
// Results go to stdout, diagnostics to stderr. Both are plain text when stdout
// is a terminal and one JSON object per line otherwise; `--json` always picks
// JSON so scripts get a stable shape even under a pty.

use serde::Serialize;
use serde_json::json;
use std::io::{self, IsTerminal, Write};

use crate::exit_code::ExitCode;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn detect(json_flag: bool) -> Self {
        Self::choose(json_flag, io::stdout().is_terminal())
    }

    fn choose(json_flag: bool, stdout_is_tty: bool) -> Self {
        if json_flag || !stdout_is_tty {
            Self::Json
        } else {
            Self::Human
        }
    }
}

/// Print a command result to stdout.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    emit(&mut io::stdout().lock(), format, value, human_fn)
}

fn emit<W, T, F>(writer: &mut W, format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => writeln!(writer, "{}", human_fn(value)),
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

// ── Diagnostics ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Error => ANSI_RED,
            Self::Warning => ANSI_YELLOW,
        }
    }
}

/// A stable code plus message, e.g. `DOCUMENT_NOT_FOUND`.
#[derive(Debug, Clone, Copy)]
struct Diagnostic<'a> {
    severity: Severity,
    code: &'a str,
    message: &'a str,
}

impl Diagnostic<'_> {
    /// Human form is `label: message`, colored on a terminal; JSON form is
    /// `{"<label>": {"code": .., "message": ..}}`.
    fn render(&self, format: OutputFormat, color: bool) -> String {
        let label = self.severity.label();
        match format {
            OutputFormat::Human if color => {
                format!("{}{label}:{ANSI_RESET} {}", self.severity.color(), self.message)
            }
            OutputFormat::Human => format!("{label}: {}", self.message),
            OutputFormat::Json => {
                json!({ (label): { "code": self.code, "message": self.message } }).to_string()
            }
        }
    }

    fn print(&self, format: OutputFormat) {
        let line = self.render(format, io::stderr().is_terminal());
        let _ = writeln!(io::stderr().lock(), "{line}");
    }
}

pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    Diagnostic { severity: Severity::Error, code, message }.print(format);
}

pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    Diagnostic { severity: Severity::Warning, code, message }.print(format);
}

/// Print a command failure under the code its exit status maps to.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    print_error(format, error_code(error), &format!("{error:#}"));
}

fn error_code(error: &anyhow::Error) -> &'static str {
    match ExitCode::from_error(error) {
        ExitCode::Usage => "INVALID_INPUT",
        ExitCode::NotFound => "DOCUMENT_NOT_FOUND",
        ExitCode::Auth => "AUTH_FAILURE",
        ExitCode::Network => "REMOTE_UNAVAILABLE",
        ExitCode::Rejected => "REMOTE_REJECTED",
        ExitCode::Success | ExitCode::Error => "ERROR",
    }
}
