//! Test cases and the matrices that hold them

use super::MatrixError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Trust anchor used when none is configured
pub const DEFAULT_TRUST_ANCHOR: &str = "ca/root/root.cert.pem";

/// The identity the local test servers' CA allows
pub const ALLOWED_DOMAIN: &str = "only-this-domain-is-allowed.com";

/// An identity outside the CA's permitted names
pub const DISALLOWED_DOMAIN: &str = "this-domain-is-not-allowed.com";

/// One request to make and the outcome it should have
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub name: String,
    /// `host:port`, or `:port` for localhost
    pub address: String,
    /// Name the server certificate is verified against
    pub expected_identity: String,
    pub expect_success: bool,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        expected_identity: impl Into<String>,
        expect_success: bool,
    ) -> Self {
        TestCase {
            name: name.into(),
            address: address.into(),
            expected_identity: expected_identity.into(),
            expect_success,
        }
    }
}

/// The four cases run against the local test servers
///
/// Only the server on 8443 presents a certificate that is valid for the
/// allowed domain under the CA's name constraints.
pub fn default_matrix() -> Vec<TestCase> {
    vec![
        TestCase::new("domain_correct_ou_correct", ":8443", ALLOWED_DOMAIN, true),
        TestCase::new("domain_incorrect_ou_correct", ":8444", ALLOWED_DOMAIN, false),
        TestCase::new("domain_correct_ou_incorrect", ":8445", DISALLOWED_DOMAIN, false),
        TestCase::new("domain_incorrect_ou_incorrect", ":8446", DISALLOWED_DOMAIN, false),
    ]
}

/// Parse a JSON array of test cases
pub fn parse_matrix(json: &str) -> Result<Vec<TestCase>, MatrixError> {
    let cases: Vec<TestCase> = serde_json::from_str(json)?;
    if cases.is_empty() {
        return Err(MatrixError::Empty);
    }

    let mut seen = HashSet::new();
    for (index, case) in cases.iter().enumerate() {
        if case.name.trim().is_empty() {
            return Err(MatrixError::InvalidCase {
                index,
                reason: "empty name".to_string(),
            });
        }
        if case.address.trim().is_empty() {
            return Err(MatrixError::InvalidCase {
                index,
                reason: format!("{}: empty address", case.name),
            });
        }
        if !seen.insert(case.name.as_str()) {
            warn!("test case name {:?} appears more than once", case.name);
        }
    }

    Ok(cases)
}

/// Read and parse a matrix file
pub fn load_matrix(path: &Path) -> Result<Vec<TestCase>, MatrixError> {
    let json = std::fs::read_to_string(path).map_err(|source| MatrixError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(&json)
}
