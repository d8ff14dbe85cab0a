//! Running test cases

use super::case::TestCase;
use super::outcome::{Failure, FailureKind, Outcome, Verdict};
use crate::http::tls::{TlsConfig, TlsError, TlsVersion};
use crate::http::HttpsTransport;
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Bound on each request, connect through response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path requested from every server
const REQUEST_PATH: &str = "/";

/// The result of one case
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    #[serde(flatten)]
    pub case: TestCase,
    pub verdict: Verdict,
    pub passed: bool,
    pub outcome: Outcome,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl CaseReport {
    fn new(case: &TestCase, outcome: Outcome, elapsed: Duration) -> Self {
        let verdict = Verdict::classify(case.expect_success, &outcome);
        CaseReport {
            case: case.clone(),
            verdict,
            passed: verdict.passed(),
            outcome,
            elapsed,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
}

/// The results of a run, in case order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Runs test cases against a shared trust anchor
#[derive(Debug, Clone)]
pub struct Runner {
    trust_anchor: PathBuf,
    timeout: Duration,
    min_version: TlsVersion,
}

impl Runner {
    pub fn new(trust_anchor: impl Into<PathBuf>) -> Self {
        Runner {
            trust_anchor: trust_anchor.into(),
            timeout: DEFAULT_TIMEOUT,
            min_version: TlsVersion::Tls12,
        }
    }

    /// Set the per-request bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse to negotiate anything older than `version`
    pub fn with_min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    pub fn min_version(&self) -> TlsVersion {
        self.min_version
    }

    pub fn trust_anchor(&self) -> &Path {
        &self.trust_anchor
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the transport for one case
    ///
    /// The anchor file is read again on every call; nothing is cached
    /// between cases.
    pub fn transport_for(&self, case: &TestCase) -> Result<HttpsTransport, TlsError> {
        let tls = TlsConfig::client()
            .trust_anchor_file(&self.trust_anchor)?
            .expected_identity(case.expected_identity.as_str())
            .min_version(self.min_version)
            .build()?;
        Ok(HttpsTransport::new(tls, self.timeout))
    }

    /// Run a single case; never fails
    pub fn run_case(&self, case: &TestCase) -> CaseReport {
        let started = Instant::now();
        debug!(
            "running {}: {} as {}",
            case.name, case.address, case.expected_identity
        );

        let outcome = match self.transport_for(case) {
            Ok(transport) => Outcome::from_result(transport.exchange(&case.address, REQUEST_PATH)),
            Err(err) => {
                warn!("{}: cannot build TLS client: {}", case.name, err);
                Outcome::Failed(Failure::new(FailureKind::Configuration, err.to_string()))
            }
        };

        let report = CaseReport::new(case, outcome, started.elapsed());
        debug!("{}: {:?} in {:?}", case.name, report.verdict, report.elapsed);
        report
    }

    /// Run every case in order
    pub fn run(&self, cases: &[TestCase]) -> RunReport {
        self.run_each(cases, |_| {})
    }

    /// Run every case in order, handing each report to `on_case` as soon as
    /// the case finishes
    pub fn run_each<F>(&self, cases: &[TestCase], mut on_case: F) -> RunReport
    where
        F: FnMut(&CaseReport),
    {
        let mut report = RunReport::default();
        for case in cases {
            let case_report = self.run_case(case);
            on_case(&case_report);
            report.cases.push(case_report);
        }
        report
    }

    /// Run all cases concurrently, one thread per case
    ///
    /// Reports come back in case order.
    pub fn run_parallel(&self, cases: &[TestCase]) -> RunReport {
        let started = Instant::now();
        let cases = thread::scope(|scope| {
            let handles: Vec<_> = cases
                .iter()
                .map(|case| (case, scope.spawn(move || self.run_case(case))))
                .collect();

            handles
                .into_iter()
                .map(|(case, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        let failure = Failure::new(FailureKind::Protocol, "test case panicked");
                        CaseReport::new(case, Outcome::Failed(failure), started.elapsed())
                    })
                })
                .collect()
        });
        RunReport { cases }
    }
}
