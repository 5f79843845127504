//! `ukfaasd version`.

/// Commit the binary was built from, stamped by CI; `dev` otherwise.
const GIT_SHA: &str = match option_env!("UKFAAS_GIT_SHA") {
    Some(sha) => sha,
    None => "dev",
};

pub fn run() {
    println!("ukfaasd {} ({GIT_SHA})", env!("CARGO_PKG_VERSION"));
}

/// Release metadata for `/system/info`.
pub fn version_info() -> ukfaas_server::VersionInfo {
    ukfaas_server::VersionInfo {
        release: env!("CARGO_PKG_VERSION").to_string(),
        sha: GIT_SHA.to_string(),
    }
}
