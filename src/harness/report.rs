//! Report rendering
//!
//! Verdicts are plain values; everything presentational, including color,
//! lives here.

use super::outcome::{Outcome, Verdict};
use super::runner::{CaseReport, RunReport};
use serde_json::json;
use std::io::{self, Write};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Writes a run report, either all at once or case by case
pub trait Renderer {
    /// Called once before the first case
    fn begin(&mut self, out: &mut dyn Write, title: &str) -> io::Result<()>;

    fn case(&mut self, out: &mut dyn Write, report: &CaseReport) -> io::Result<()>;

    /// Called once after the last case
    fn finish(&mut self, out: &mut dyn Write, run: &RunReport) -> io::Result<()>;

    /// Render a completed run
    fn render(&mut self, out: &mut dyn Write, title: &str, run: &RunReport) -> io::Result<()> {
        self.begin(out, title)?;
        for case in &run.cases {
            self.case(out, case)?;
        }
        self.finish(out, run)
    }
}

/// Human-readable report with check marks
#[derive(Debug, Clone)]
pub struct TextRenderer {
    color: bool,
}

impl TextRenderer {
    pub fn new(color: bool) -> Self {
        TextRenderer { color }
    }

    fn mark(&self, passed: bool) -> String {
        let (glyph, color) = if passed { ("✔", GREEN) } else { ("✘", RED) };
        if self.color {
            format!("{}{}{}", color, glyph, RESET)
        } else {
            glyph.to_string()
        }
    }
}

impl Renderer for TextRenderer {
    fn begin(&mut self, out: &mut dyn Write, title: &str) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", title)?;
        writeln!(out, "{}", "=".repeat(title.chars().count()))?;
        writeln!(out)
    }

    fn case(&mut self, out: &mut dyn Write, report: &CaseReport) -> io::Result<()> {
        let case = &report.case;
        writeln!(out, "Testing {}", case.name)?;
        write!(
            out,
            "  {} Request to {} (as {}) ",
            self.mark(report.passed),
            case.address,
            case.expected_identity
        )?;

        match (&report.outcome, report.verdict) {
            (
                Outcome::Succeeded {
                    body,
                    tls_version,
                    peer_chain,
                    ..
                },
                Verdict::ExpectedSuccessObserved,
            ) => {
                writeln!(out, "succeeded")?;
                writeln!(out, "    - Response: {}", body)?;
                match peer_chain.first() {
                    Some(leaf) => writeln!(
                        out,
                        "    - {}, certificate {} issued by {}",
                        tls_version, leaf.subject, leaf.issuer
                    )?,
                    None => writeln!(out, "    - {}", tls_version)?,
                }
            }
            (Outcome::Succeeded { .. }, _) => {
                writeln!(out, "succeeded but was not expected to")?;
            }
            (Outcome::Failed(failure), Verdict::ExpectedFailureObserved) => {
                writeln!(out, "failed as expected: {}", failure)?;
            }
            (Outcome::Failed(failure), _) => {
                writeln!(out, "failed: {}", failure)?;
            }
        }
        writeln!(out)
    }

    fn finish(&mut self, out: &mut dyn Write, run: &RunReport) -> io::Result<()> {
        writeln!(
            out,
            "{} {} of {} cases passed, {} failed",
            self.mark(run.all_passed()),
            run.passed(),
            run.len(),
            run.failed()
        )
    }
}

/// One JSON object per line: a line per case, then a summary line
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    pub fn new() -> Self {
        JsonRenderer
    }
}

impl Renderer for JsonRenderer {
    fn begin(&mut self, _out: &mut dyn Write, _title: &str) -> io::Result<()> {
        Ok(())
    }

    fn case(&mut self, out: &mut dyn Write, report: &CaseReport) -> io::Result<()> {
        serde_json::to_writer(&mut *out, report)?;
        writeln!(out)
    }

    fn finish(&mut self, out: &mut dyn Write, run: &RunReport) -> io::Result<()> {
        let summary = json!({
            "summary": {
                "total": run.len(),
                "passed": run.passed(),
                "failed": run.failed(),
                "all_passed": run.all_passed(),
            }
        });
        serde_json::to_writer(&mut *out, &summary)?;
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::outcome::{Failure, FailureKind};
    use crate::harness::TestCase;
    use crate::http::tls::CertInfo;
    use std::time::Duration;

    fn report(expect_success: bool, outcome: Outcome) -> CaseReport {
        let verdict = Verdict::classify(expect_success, &outcome);
        CaseReport {
            case: TestCase::new("case", ":8443", "only-this-domain-is-allowed.com", expect_success),
            verdict,
            passed: verdict.passed(),
            outcome,
            elapsed: Duration::from_millis(12),
        }
    }

    fn ok() -> Outcome {
        Outcome::Succeeded {
            status: 200,
            body: "Hello from :8443".to_string(),
            tls_version: "TLSv1.3".to_string(),
            peer_chain: vec![CertInfo {
                subject: "only-this-domain-is-allowed.com".to_string(),
                issuer: "Test Root".to_string(),
                subject_alt_names: vec!["DNS:only-this-domain-is-allowed.com".to_string()],
            }],
        }
    }

    fn err() -> Outcome {
        Outcome::Failed(Failure::new(FailureKind::Handshake, "hostname mismatch"))
    }

    fn render_text(color: bool, run: &RunReport) -> String {
        let mut out = Vec::new();
        TextRenderer::new(color)
            .render(&mut out, "Testing using the OpenSSL client", run)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_lines() {
        let run = RunReport {
            cases: vec![
                report(true, ok()),
                report(false, err()),
                report(true, err()),
                report(false, ok()),
            ],
        };
        let text = render_text(false, &run);

        assert!(text.starts_with("\nTesting using the OpenSSL client\n================================\n\n"));
        assert!(text.contains(
            "Testing case\n  ✔ Request to :8443 (as only-this-domain-is-allowed.com) succeeded\n    - Response: Hello from :8443\n    - TLSv1.3, certificate only-this-domain-is-allowed.com issued by Test Root\n"
        ));
        assert!(text.contains("  ✔ Request to :8443 (as only-this-domain-is-allowed.com) failed as expected: hostname mismatch\n"));
        assert!(text.contains("  ✘ Request to :8443 (as only-this-domain-is-allowed.com) failed: hostname mismatch\n"));
        assert!(text.contains("  ✘ Request to :8443 (as only-this-domain-is-allowed.com) succeeded but was not expected to\n"));
        assert!(text.ends_with("✘ 2 of 4 cases passed, 2 failed\n"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_text_color() {
        let run = RunReport {
            cases: vec![report(true, ok())],
        };
        let text = render_text(true, &run);
        assert!(text.contains("\x1b[32m✔\x1b[0m Request to"));
    }

    #[test]
    fn test_json_lines() {
        let run = RunReport {
            cases: vec![report(true, ok()), report(true, err())],
        };
        let mut out = Vec::new();
        JsonRenderer::new().render(&mut out, "ignored", &run).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["verdict"], "expected_success_observed");
        assert_eq!(lines[0]["outcome"]["body"], "Hello from :8443");
        assert_eq!(lines[0]["outcome"]["tls_version"], "TLSv1.3");
        assert_eq!(lines[1]["verdict"], "unexpected_failure");
        assert_eq!(lines[1]["outcome"]["message"], "hostname mismatch");
        assert_eq!(lines[2]["summary"]["failed"], 1);
        assert_eq!(lines[2]["summary"]["all_passed"], false);
    }
}
