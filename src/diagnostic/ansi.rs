use crate::ast::SourceMap;
use super::{Diagnostic, Severity};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_yellow(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;33m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    /// `path` names the file in the `-->` line when given.
    pub fn render(&self, d: &Diagnostic, path: Option<&str>) -> String {
        let mut out = String::new();

        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let heading = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        let heading = match d.severity {
            Severity::Error => self.bold_red(&heading),
            Severity::Warning => self.bold_yellow(&heading),
        };
        // Failure messages start with a newline; keep their layout.
        out.push_str(&format!("{}: {}\n", heading, self.bold(&d.message)));

        let primary = d.labels.iter().find(|l| l.is_primary);
        if let (Some(label), Some(source)) = (primary, &d.source) {
            let map = SourceMap::new(source);
            let pos = map.lookup(label.span.start);
            let line_text = map.line_text(pos.line);

            let location = match path {
                Some(path) => format!("{path}:{pos}"),
                None => pos.to_string(),
            };
            out.push_str(&format!("  {} {}\n", self.cyan("-->"), location));

            let gutter = pos.line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);
            out.push_str(&format!("{pad} {pipe}\n"));

            let line_num = self.cyan(&format!("{:>gutter$}", pos.line));
            out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

            // Clamp carets to the line so multi-line spans underline the first line only.
            let indent = " ".repeat(pos.col - 1);
            let room = line_text.len().saturating_sub(pos.col - 1).max(1);
            let span_len = label.span.end.saturating_sub(label.span.start).clamp(1, room);
            let carets = self.bold_red(&"^".repeat(span_len));
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
            }
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} help: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    const SRC: &str = "module top\nfn f() {\n  addd\n}";

    fn make_diag() -> Diagnostic {
        Diagnostic::error("unknown opcode `addd`")
            .with_code("HVM-P007")
            .with_span(Span::new(22, 26), "here")
            .with_source(SRC.to_string())
            .with_note("in function 'top::f'")
            .with_suggestion("did you mean `add`?")
    }

    #[test]
    fn render_heading_carries_code() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag(), None);
        assert!(out.starts_with("error[HVM-P007]: unknown opcode `addd`\n"), "got:\n{out}");
    }

    #[test]
    fn render_location_and_snippet() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag(), Some("prog.hbc"));
        assert!(out.contains("--> prog.hbc:3:3"), "got:\n{out}");
        assert!(out.contains("3 |   addd"), "got:\n{out}");
        assert!(out.contains("|   ^^^^ here"), "got:\n{out}");
    }

    #[test]
    fn render_note_and_help() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag(), None);
        assert!(out.contains("note: in function 'top::f'"));
        assert!(out.contains("help: did you mean `add`?"));
    }

    #[test]
    fn render_without_source() {
        let out = AnsiRenderer { use_color: false }.render(&Diagnostic::error("boom"), None);
        assert_eq!(out, "error: boom\n");
    }

    #[test]
    fn color_toggle() {
        let d = make_diag();
        assert!(AnsiRenderer { use_color: true }.render(&d, None).contains("\x1b["));
        assert!(!AnsiRenderer { use_color: false }.render(&d, None).contains("\x1b["));
    }

    #[test]
    fn long_span_is_clamped_to_line() {
        let d = Diagnostic::error("bad")
            .with_span(Span::new(11, 40), "")
            .with_source(SRC.to_string());
        let out = AnsiRenderer { use_color: false }.render(&d, None);
        assert!(out.contains("| ^^^^^^^^\n"), "got:\n{out}");
    }
}
