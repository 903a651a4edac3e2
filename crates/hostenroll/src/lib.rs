//! Host certificate enrollment.
//!
//! A host holding only a low-trust bootstrap profile generates a private
//! key, asks the CA service to sign a CSR for it, waits for an approver, and
//! writes a kubeconfig-shaped identity config with the issued certificate.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hostenroll::{load_bootstrap, BootstrapOptions, Bootstrapper};
//!
//! #[tokio::main]
//! async fn main() -> hostenroll::Result<()> {
//!     let profile = load_bootstrap("/etc/hostenroll/bootstrap.yaml".as_ref())?;
//!     let options = BootstrapOptions::new("node-1", "/var/lib/hostenroll", "/root/.hostenroll/config");
//!
//!     let outcome = Bootstrapper::from_profile(options, &profile)?
//!         .run(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! Every step is safe to repeat: the key file and the request name are
//! derived from the host name, so a rerun picks up where the last one
//! stopped.

#![doc(html_root_url = "https://docs.rs/hostenroll/0.3.0")]

pub mod bootstrap;
pub mod profile;

pub use bootstrap::{BootstrapOptions, BootstrapOutcome, Bootstrapper};
pub use profile::{load_bootstrap, load_identity, write_identity, BootstrapProfile, CaTrust};

// Re-export the building blocks
pub use hostenroll_client::{api, EnrollClient, EnrollClientBuilder, PollConfig, RetryConfig};
pub use hostenroll_core::*;
pub use hostenroll_pki::{csr, key, verify, CertificateSummary, KeyAlgorithm, PrivateKey};
