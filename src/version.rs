// Build-time identity from Cargo.toml, logged at startup

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `name/version`, e.g. for log lines and user agents.
pub fn user_agent() -> String {
    format!("{NAME}/{VERSION}")
}
