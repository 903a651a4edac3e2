//! Core types for host certificate enrollment.
//!
//! This crate provides the foundational types shared by the enrollment crates:
//!
//! - **Types**: the CA service's enrollment request resource and the
//!   kubeconfig-shaped identity profile
//! - **Naming**: deterministic names derived from a host identifier
//! - **Errors**: the enrollment error taxonomy in [`EnrollError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use hostenroll_core::{naming, EnrollmentRequest, EnrollmentState};
//!
//! fn report(req: &EnrollmentRequest) {
//!     assert_eq!(req.name(), naming::request_name("node-1"));
//!     if req.state() == EnrollmentState::Issued {
//!         println!("certificate attached");
//!     }
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hostenroll-core/0.3.0")]

mod error;
pub mod naming;
pub mod types;

pub use error::{EnrollError, ErrorKind, Result};
pub use types::*;
