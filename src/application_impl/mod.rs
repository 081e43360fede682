mod credential_generator;
mod secret_deriver_impl;
mod session_service_impl;
mod token_codec_jwt;

pub use credential_generator::*;
pub use secret_deriver_impl::*;
pub use session_service_impl::*;
pub use token_codec_jwt::*;
