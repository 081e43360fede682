mod credential_issuer;
mod session_service;

pub use credential_issuer::*;
pub use session_service::*;
