//! Lax parsing of resource-quantity strings.
//!
//! Deployments carry quantities as free-form strings (`"1"`, `"500m"`,
//! `"256Mi"`). Replica construction parses them leniently: a malformed value
//! yields `None` and the caller falls back to the default.

use crate::machine::ResourceSpec;

/// Default vCPU count for a replica.
pub const DEFAULT_VCPUS: u64 = 1;

/// Default memory for a replica: 256 MiB.
pub const DEFAULT_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

/// Default replica resources.
pub fn default_resources() -> ResourceSpec {
    ResourceSpec {
        vcpus: DEFAULT_VCPUS,
        memory_bytes: DEFAULT_MEMORY_BYTES,
    }
}

/// Parses a CPU quantity into whole vCPUs.
///
/// Accepts plain integers and milli-CPU (`"1500m"`); fractional vCPUs round
/// up since the hypervisor only takes whole cores. Returns `None` for
/// anything unparseable or zero.
pub fn parse_cpu(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let vcpus = if let Some(milli) = value.strip_suffix('m') {
        milli.parse::<u64>().ok()?.div_ceil(1000)
    } else {
        value.parse::<u64>().ok()?
    };

    (vcpus > 0).then_some(vcpus)
}

/// Parses a memory quantity into bytes.
///
/// Accepts plain byte counts, binary suffixes (`Ki`, `Mi`, `Gi`) and decimal
/// suffixes (`K`, `M`, `G`). Returns `None` for anything unparseable or zero.
pub fn parse_memory(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, multiplier) = match value {
        v if v.ends_with("Ki") => (&v[..v.len() - 2], 1024),
        v if v.ends_with("Mi") => (&v[..v.len() - 2], 1024 * 1024),
        v if v.ends_with("Gi") => (&v[..v.len() - 2], 1024 * 1024 * 1024),
        v if v.ends_with('K') => (&v[..v.len() - 1], 1000),
        v if v.ends_with('M') => (&v[..v.len() - 1], 1000 * 1000),
        v if v.ends_with('G') => (&v[..v.len() - 1], 1000 * 1000 * 1000),
        v => (v, 1),
    };

    let bytes = digits.parse::<u64>().ok()?.checked_mul(multiplier)?;
    (bytes > 0).then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1", Some(1))]
    #[test_case("4", Some(4))]
    #[test_case("500m", Some(1); "milli rounds up")]
    #[test_case("2500m", Some(3))]
    #[test_case("0", None)]
    #[test_case("", None)]
    #[test_case("lots", None)]
    fn test_parse_cpu(input: &str, expected: Option<u64>) {
        assert_eq!(parse_cpu(input), expected);
    }

    #[test_case("256Mi", Some(256 * 1024 * 1024))]
    #[test_case("1Gi", Some(1024 * 1024 * 1024))]
    #[test_case("512Ki", Some(512 * 1024))]
    #[test_case("1000", Some(1000))]
    #[test_case("2G", Some(2_000_000_000))]
    #[test_case("0", None)]
    #[test_case("plenty", None)]
    fn test_parse_memory(input: &str, expected: Option<u64>) {
        assert_eq!(parse_memory(input), expected);
    }
}
