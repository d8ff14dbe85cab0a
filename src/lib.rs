//! certmatrix - TLS client verification harness
//!
//! This crate drives a small matrix of HTTPS requests through a strictly
//! verifying TLS client and reports whether each handshake succeeded or
//! failed as predicted.
//!
//! - [`http`] holds the blocking HTTP/1.1 client and the OpenSSL-backed TLS
//!   client factory (custom trust anchor, expected identity decoupled from
//!   the dialed address).
//! - [`harness`] holds test cases, outcome classification, the runner and
//!   the report renderers.

pub mod harness;
pub mod http;
