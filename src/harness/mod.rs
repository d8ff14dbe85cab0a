//! Verification test runner
//!
//! A run takes an ordered list of [`TestCase`]s, builds a fresh HTTPS
//! transport for each one, issues a single GET and classifies what happened
//! against what the case expected.
//!
//! ```no_run
//! use certmatrix::harness::{default_matrix, Renderer, Runner, TextRenderer};
//!
//! let runner = Runner::new("ca/root/root.cert.pem");
//! let report = runner.run(&default_matrix());
//!
//! let mut out = std::io::stdout();
//! TextRenderer::new(false).render(&mut out, "Testing", &report).unwrap();
//! assert!(report.all_passed());
//! ```

pub mod case;
pub mod outcome;
pub mod report;
pub mod runner;

pub use case::{default_matrix, load_matrix, parse_matrix, TestCase};
pub use outcome::{Failure, FailureKind, Outcome, Verdict};
pub use report::{JsonRenderer, Renderer, TextRenderer};
pub use runner::{CaseReport, RunReport, Runner};

use std::path::PathBuf;

/// A test matrix file that cannot be used
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("cannot read matrix file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed matrix: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("matrix contains no test cases")]
    Empty,

    #[error("test case {index}: {reason}")]
    InvalidCase { index: usize, reason: String },
}
