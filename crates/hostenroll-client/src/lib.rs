//! HTTP client for the CA service's enrollment request API.
//!
//! This crate provides [`EnrollClient`], which submits certificate signing
//! requests and waits for an approver to act on them.
//!
//! ```rust,ignore
//! use hostenroll_client::{api::SubmitRequest, EnrollClient};
//!
//! let client = EnrollClient::builder("https://ca.example:6443")
//!     .bearer_token(token)
//!     .build()?;
//! let reference = client.requests().submit(&SubmitRequest::new(name, csr), &key).await?;
//! let issued = client.requests().wait_for_approval(&reference, timeout).await?;
//! ```

#![doc(html_root_url = "https://docs.rs/hostenroll-client/0.3.0")]

mod client;
mod config;
pub mod api;
#[cfg(feature = "test-util")]
pub mod testing;
mod wait;

pub use client::{EnrollClient, EnrollClientBuilder};
pub use config::*;
pub use hostenroll_core::{EnrollError, Result};
