//! Working-directory files written before the provider starts serving.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

const HOSTS: &str = "127.0.0.1\tlocalhost\n127.0.0.1\tukfaas.dev\n";
const RESOLV_CONF: &str = "nameserver 8.8.8.8\n";

/// Writes the `hosts` and `resolv.conf` files replicas are served, with
/// permissions 0644.
pub fn prepare_working_dir(dir: &Path) -> Result<()> {
    write_file(&dir.join("hosts"), HOSTS).context("cannot write hosts file")?;
    write_file(&dir.join("resolv.conf"), RESOLV_CONF).context("cannot write resolv.conf file")?;
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    }

    Ok(())
}
