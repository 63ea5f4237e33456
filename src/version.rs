// Build-time identity reported by GET /version and the status tool

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// "name version", e.g. for log banners.
pub fn banner() -> String {
    format!("{} {}", NAME, VERSION)
}
