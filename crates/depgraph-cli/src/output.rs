//! How `depgraph` commands write to the terminal.
//!
//! Every command produces one serializable view. [`emit`] writes it as JSON,
//! as one `key=value` line per record ([`Line`]), or as a titled panel
//! ([`Panel`]). Failures go to stderr through [`fail`], which keeps the
//! stable error code visible in every mode.
//!
//! The mode comes from `--format`, then the hidden `--json`, then the
//! `FORMAT` environment variable, and finally from whether stdout is a
//! terminal.

use clap::ValueEnum;
use depgraph_core::pipeline::FilterSummary;
use depgraph_core::{ExportError, Stage};
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Panels for people at a terminal.
    Pretty,
    /// One record per line, for pipes and scripts.
    Text,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Resolve against the real environment.
    pub fn detect(format: Option<Self>, json: bool) -> Self {
        let env = std::env::var("FORMAT").ok();
        Self::pick(format, json, env.as_deref(), io::stdout().is_terminal())
    }

    fn pick(format: Option<Self>, json: bool, env: Option<&str>, tty: bool) -> Self {
        format
            .or(json.then_some(Self::Json))
            .or_else(|| env.and_then(|raw| Self::from_str(raw.trim(), true).ok()))
            .unwrap_or(if tty { Self::Pretty } else { Self::Text })
    }
}

/// Write `view` to stdout in `mode`.
pub fn emit<T: Serialize>(
    mode: OutputMode,
    view: &T,
    text: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, view)?;
            writeln!(out)?;
        }
        OutputMode::Text => text(view, &mut out)?,
        OutputMode::Pretty => pretty(view, &mut out)?,
    }
    Ok(())
}

/// One text record: a leading tag followed by `key=value` fields.
pub struct Line {
    buf: String,
}

impl Line {
    pub fn new(tag: impl Display) -> Self {
        Self {
            buf: tag.to_string(),
        }
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: impl Display) -> Self {
        use std::fmt::Write as _;
        let _ = write!(self.buf, "  {key}={value}");
        self
    }

    pub fn write(self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}", self.buf)
    }
}

const RULE_WIDTH: usize = 72;
const KEY_WIDTH: usize = 12;

/// A titled block of aligned rows.
pub struct Panel<'w> {
    w: &'w mut dyn Write,
}

impl<'w> Panel<'w> {
    pub fn open(w: &'w mut dyn Write, title: impl Display) -> io::Result<Self> {
        writeln!(w, "{title}")?;
        writeln!(w, "{}", "-".repeat(RULE_WIDTH))?;
        Ok(Self { w })
    }

    pub fn row(&mut self, key: &str, value: impl Display) -> io::Result<&mut Self> {
        writeln!(self.w, "{key:<KEY_WIDTH$} {value}")?;
        Ok(self)
    }

    /// Indented line under the last row, for warnings and list items.
    pub fn note(&mut self, marker: &str, text: impl Display) -> io::Result<&mut Self> {
        writeln!(self.w, "  {marker} {text}")?;
        Ok(self)
    }
}

/// `"3 kept, 2 dropped (1 excluded, 1 not included)"`; zero reasons are
/// left out.
pub fn describe_filter(filter: &FilterSummary) -> String {
    let mut text = format!("{} kept, {} dropped", filter.kept, filter.dropped);
    let reasons: Vec<String> = [
        (filter.excluded, "excluded"),
        (filter.not_included, "not included"),
        (filter.out_of_scope, "out of scope"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, reason)| format!("{count} {reason}"))
    .collect();
    if !reasons.is_empty() {
        text.push_str(&format!(" ({})", reasons.join(", ")));
    }
    text
}

/// Serializable shape of an [`ExportError`].
#[derive(Debug, Serialize)]
pub struct Failure {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl From<&ExportError> for Failure {
    fn from(err: &ExportError) -> Self {
        Self {
            code: err.code().code(),
            stage: err.stage().map(Stage::as_str),
            message: err.to_string(),
            hint: err.hint(),
        }
    }
}

impl Failure {
    fn write(&self, mode: OutputMode, w: &mut dyn Write) -> io::Result<()> {
        if mode.is_json() {
            serde_json::to_writer_pretty(&mut *w, &serde_json::json!({ "error": self }))?;
            return writeln!(w);
        }
        writeln!(w, "error[{}]: {}", self.code, self.message)?;
        if let Some(hint) = self.hint {
            writeln!(w, "  hint: {hint}")?;
        }
        Ok(())
    }
}

/// Report `err` on stderr and turn it into the command's error.
pub fn fail(mode: OutputMode, err: &ExportError) -> anyhow::Error {
    match Failure::from(err).write(mode, &mut io::stderr().lock()) {
        Ok(()) => anyhow::anyhow!("{err}"),
        Err(io_err) => io_err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_format_beats_json_flag_and_env() {
        let mode = OutputMode::pick(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
        assert_eq!(OutputMode::pick(None, true, Some("pretty"), true), OutputMode::Json);
    }

    #[test]
    fn format_env_is_case_insensitive_and_unknown_values_fall_back() {
        assert_eq!(OutputMode::pick(None, false, Some(" JSON "), true), OutputMode::Json);
        assert_eq!(OutputMode::pick(None, false, Some("fancy"), true), OutputMode::Pretty);
        assert_eq!(OutputMode::pick(None, false, None, false), OutputMode::Text);
    }

    #[test]
    fn filter_description_lists_only_nonzero_reasons() {
        let filter = FilterSummary {
            kept: 3,
            dropped: 2,
            excluded: 1,
            not_included: 0,
            out_of_scope: 1,
        };
        assert_eq!(describe_filter(&filter), "3 kept, 2 dropped (1 excluded, 1 out of scope)");
        assert_eq!(describe_filter(&FilterSummary::default()), "0 kept, 0 dropped");
    }

    #[test]
    fn line_and_panel_layout() {
        let mut buf = Vec::new();
        Line::new("cleanup")
            .field("deleted", 2)
            .field("failed", 0)
            .write(&mut buf)
            .expect("line");
        let mut panel = Panel::open(&mut buf, "Exported g:a:1").expect("panel");
        panel.row("edges", 12).expect("row");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("cleanup  deleted=2  failed=0\nExported g:a:1\n---"));
        assert!(text.ends_with("\nedges        12\n"));
    }

    #[test]
    fn failure_carries_code_stage_and_hint() {
        let err = ExportError::Connection {
            stage: Stage::Connect,
            attempts: 3,
            source: "refused".into(),
        };
        let failure = Failure::from(&err);
        assert_eq!((failure.code, failure.stage), ("E2001", Some("connect")));
        assert!(failure.hint.is_some());

        let mut buf = Vec::new();
        failure.write(OutputMode::Text, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("error[E2001]: connect: backend unreachable after 3 attempt(s)"));
        assert!(text.contains("\n  hint: "));
    }

    #[test]
    fn failure_json_omits_absent_fields() {
        let json = serde_json::to_value(Failure::from(&ExportError::NotConnected)).expect("json");
        assert_eq!(json["code"], "E2002");
        assert!(json.get("stage").is_none());
        assert!(json.get("hint").is_none());
    }
}
