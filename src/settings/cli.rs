use super::Parser;

/// Issues and rotates access/refresh token pairs.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Path to a settings file; defaults to `settings/dev.toml` in debug builds.
    #[arg(long)]
    pub settings: Option<String>,

    /// Listen address, overriding `http.address`.
    #[arg(long)]
    pub address: Option<String>,
}
