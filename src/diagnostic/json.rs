use serde::Serialize;

use super::{Diagnostic, Severity};
use crate::ast::SourceMap;

#[derive(Serialize)]
struct JsonLabel<'a> {
    start: usize,
    end: usize,
    message: &'a str,
    primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col: Option<usize>,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: &'a str,
    labels: Vec<JsonLabel<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

fn shape(d: &Diagnostic) -> JsonDiagnostic<'_> {
    let source_map = d.source.as_deref().map(SourceMap::new);
    let labels = d
        .labels
        .iter()
        .map(|l| {
            let pos = source_map.as_ref().map(|map| map.lookup(l.span.start));
            JsonLabel {
                start: l.span.start,
                end: l.span.end,
                message: &l.message,
                primary: l.is_primary,
                line: pos.map(|p| p.line),
                col: pos.map(|p| p.col),
            }
        })
        .collect();
    JsonDiagnostic {
        severity: match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        },
        code: d.code,
        message: &d.message,
        labels,
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    }
}

pub fn to_value(d: &Diagnostic) -> serde_json::Value {
    serde_json::to_value(shape(d)).unwrap_or(serde_json::Value::Null)
}

/// One line of JSON per diagnostic.
pub fn render(d: &Diagnostic) -> String {
    serde_json::to_string(&shape(d))
        .unwrap_or_else(|_| r#"{"severity":"error","message":"diagnostic could not be serialized"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("stack underflow").with_code("HVM-R001")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["code"], "HVM-R001");
        assert_eq!(v["message"], "stack underflow");
        assert!(v["labels"].as_array().unwrap().is_empty());
    }

    #[test]
    fn render_with_span_and_source() {
        let d = Diagnostic::error("bad operand")
            .with_span(Span::new(13, 17), "here")
            .with_source("module m\nfn f() {}".to_string());
        let v = parse_json(&render(&d));
        let label = &v["labels"][0];
        assert_eq!(label["start"], 13);
        assert_eq!(label["primary"], true);
        assert_eq!(label["line"], 2);
        assert_eq!(label["col"], 5);
    }

    #[test]
    fn optional_keys_absent() {
        let v = parse_json(&render(&Diagnostic::error("bad").with_span(Span::new(0, 1), "")));
        assert!(v.get("suggestion").is_none());
        assert!(v.get("code").is_none());
        assert!(v["labels"][0].get("line").is_none());
    }

    #[test]
    fn warning_severity() {
        let v = to_value(&Diagnostic::warning("unused"));
        assert_eq!(v["severity"], "warning");
    }
}
