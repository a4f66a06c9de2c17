//! Terminal output on stderr.

use console::{Style, Term};

pub(crate) struct Output {
    term: Term,
    ok: Style,
    warn: Style,
    fail: Style,
    muted: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            ok: Style::new().green(),
            warn: Style::new().yellow(),
            fail: Style::new().red().bold(),
            muted: Style::new().dim(),
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        self.line(None, msg);
    }

    pub(crate) fn success(&self, msg: &str) {
        self.line(Some(&self.ok), msg);
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.line(Some(&self.warn), msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.line(Some(&self.fail), msg);
    }

    /// Indented entry of a list printed after a heading.
    pub(crate) fn item(&self, msg: &str) {
        self.line(Some(&self.muted), &format!("  {msg}"));
    }

    fn line(&self, style: Option<&Style>, msg: &str) {
        // Terminal write failures are not actionable.
        let _ = match style {
            Some(style) => self.term.write_line(&style.apply_to(msg).to_string()),
            None => self.term.write_line(msg),
        };
    }
}
