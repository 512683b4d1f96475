//! `.err` document layout
//!
//! ```text
//! ../inputs/in1.err      one line per cause, relative to the port's folder
//! ../inputs/in2.err
//!                        blank separator (always present)
//! Errors in input        message, a single line
//! trace line 1           trace, verbatim
//! trace line 2
//! ```
//!
//! Everything after the message line is the trace, byte for byte. A trace
//! without a final newline is written without one.

use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use serde::{Deserialize, Serialize};

pub(crate) const ERROR_SUFFIX: &str = ".err";

/// Structured form of an error port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDocument {
    pub message: String,
    pub trace: String,
    /// `.err` files of the errors that caused this one, in order
    pub caused_by: Vec<BundlePath>,
}

impl ErrorDocument {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        ErrorDocument {
            message: message.into(),
            trace: trace.into(),
            caused_by: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: BundlePath) -> Self {
        self.caused_by.push(cause);
        self
    }

    /// Render the document for a port living in `port_dir`
    pub(crate) fn render(&self, port_dir: &BundlePath) -> Result<String> {
        if self.message.contains(['\n', '\r']) {
            return Err(BundleError::InvalidArgument(
                "error message must be a single line".to_string(),
            ));
        }

        let mut out = String::new();
        for cause in &self.caused_by {
            out.push_str(&cause.relative_to(port_dir));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.message);
        out.push('\n');
        out.push_str(&self.trace);
        Ok(out)
    }

    /// Parse the content of `path`, resolving causes against `port_dir`
    pub(crate) fn parse(text: &str, port_dir: &BundlePath, path: &BundlePath) -> Result<Self> {
        let mut caused_by = Vec::new();
        let mut rest = text;
        loop {
            let (line, tail) = rest.split_once('\n').ok_or_else(|| BundleError::MalformedError {
                path: path.to_string(),
                reason: "missing blank line before the message".to_string(),
            })?;
            rest = tail;

            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            let cause = port_dir
                .resolve(line)
                .map_err(|e| BundleError::MalformedError {
                    path: path.to_string(),
                    reason: format!("bad cause '{}': {}", line, e),
                })?;
            caused_by.push(cause);
        }

        let (message, trace) = rest.split_once('\n').unwrap_or((rest, ""));
        let message = message.strip_suffix('\r').unwrap_or(message);

        Ok(ErrorDocument {
            message: message.to_string(),
            trace: trace.to_string(),
            caused_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> BundlePath {
        BundlePath::new(s).unwrap()
    }

    #[test]
    fn test_render_without_causes() {
        let doc = ErrorDocument::new("Something did not work", "A very\n long\n trace");
        let text = doc.render(&p("inputs")).unwrap();
        assert_eq!(text, "\nSomething did not work\nA very\n long\n trace");
    }

    #[test]
    fn test_parse_keeps_final_newline_of_trace() {
        let parsed = ErrorDocument::parse("\nmsg\nt\n", &p("outputs"), &p("outputs/x.err")).unwrap();
        assert_eq!(parsed.trace, "t\n");

        let parsed = ErrorDocument::parse("\nmsg\nt", &p("outputs"), &p("outputs/x.err")).unwrap();
        assert_eq!(parsed.trace, "t");

        let parsed = ErrorDocument::parse("\nmsg", &p("outputs"), &p("outputs/x.err")).unwrap();
        assert_eq!(parsed.message, "msg");
        assert_eq!(parsed.trace, "");
    }

    #[test]
    fn test_render_causes_relative_to_port() {
        let doc = ErrorDocument::new("Errors in input", "")
            .with_cause(p("inputs/in1.err"))
            .with_cause(p("outputs/other.err"));
        let text = doc.render(&p("outputs")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[..3], ["../inputs/in1.err", "other.err", ""]);
    }

    #[test]
    fn test_parse_preserves_trace() {
        for trace in ["", "one line", "no final newline\nx", "final newline\n", "\n\n"] {
            let doc = ErrorDocument::new("msg", trace).with_cause(p("inputs/a.err"));
            let text = doc.render(&p("outputs")).unwrap();
            let parsed = ErrorDocument::parse(&text, &p("outputs"), &p("outputs/x.err")).unwrap();
            assert_eq!(parsed, doc, "trace {:?}", trace);
        }
    }

    #[test]
    fn test_parse_crlf() {
        let parsed =
            ErrorDocument::parse("a.err\r\n\r\nmsg\r\ntrace", &p("inputs"), &p("inputs/x.err"))
                .unwrap();
        assert_eq!(parsed.caused_by, vec![p("inputs/a.err")]);
        assert_eq!(parsed.message, "msg");
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let result = ErrorDocument::parse("just a message", &p("inputs"), &p("inputs/x.err"));
        assert!(matches!(result, Err(BundleError::MalformedError { .. })));

        let result = ErrorDocument::parse("../../escape\n\nmsg\n", &p("inputs"), &p("inputs/x.err"));
        assert!(matches!(result, Err(BundleError::MalformedError { .. })));
    }

    #[test]
    fn test_multiline_message_rejected() {
        let doc = ErrorDocument::new("two\nlines", "");
        assert!(matches!(
            doc.render(&p("inputs")),
            Err(BundleError::InvalidArgument(_))
        ));
    }
}
