//! Provision Azure virtual machines and their network resources

pub mod azure;
pub mod config;
pub mod provision;

/// Version injected at compile time via AZPROV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZPROV_VERSION") {
    Some(v) => v,
    None => "dev",
};
