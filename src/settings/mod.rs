//! Settings come from a TOML file layered with `TOKENPAIR__*` environment
//! overrides. Signing keys are not settings; only the names of the environment
//! variables holding them are.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
