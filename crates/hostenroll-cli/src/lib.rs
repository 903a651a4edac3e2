//! # hostenroll-cli
//!
//! Command-line front end for host enrollment.
//!
//! ## Commands
//!
//! - **enroll**: generate or reuse the host key, submit a CSR and wait for
//!   the CA to issue a certificate, then write the identity config
//! - **status**: show what the CA service knows about this host's request
//! - **config**: manage defaults in the CLI config file
//!
//! ## Exit codes
//!
//! `0` success, `1` fatal, `2` usage or configuration, `3` denied by the CA,
//! `75` temporary failure (rerun to resume).

pub mod cli;
pub mod config;
pub mod output;

pub use cli::{exit_code, run};
