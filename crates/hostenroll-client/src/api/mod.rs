//! API endpoint modules.

mod requests;

pub use requests::{RequestsApi, SubmitRequest, ENROLLMENT_REQUESTS_PATH};
