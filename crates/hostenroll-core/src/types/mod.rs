mod common;
mod identity;
mod request;

pub use common::*;
pub use identity::*;
pub use request::*;
