//! Resource naming
//!
//! Every resource of one provisioning run is named after the run's ordinal.

use serde::Serialize;

/// Names and address block derived from a prefix and an ordinal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNames {
    pub domain_name: String,
    pub subnet_name: String,
    pub pip_name: String,
    pub nic_name: String,
    pub vm_name: String,
    pub os_disk_name: String,
    pub address_prefix: String,
}

/// Derive all resource names for `number`
///
/// Only the address prefix interprets `number` as an integer; the
/// other names embed it verbatim ("05" stays "05").
pub fn derive(prefix: &str, number: &str) -> ResourceNames {
    ResourceNames {
        domain_name: format!("{}-{}", prefix, number),
        subnet_name: format!("subnet-{}", number),
        pip_name: format!("ip-{}", number),
        nic_name: format!("nic-{}", number),
        vm_name: format!("machine-{}", number),
        os_disk_name: format!("machine-disk-{}", number),
        address_prefix: format!("10.0.{}.0/24", leading_integer(number)),
    }
}

/// Decimal rendering of the integer at the start of `text`
///
/// Surrounding whitespace and an optional sign are accepted, trailing
/// garbage is ignored and leading zeros are dropped. Text without leading
/// digits renders as `NaN`. The value is not range checked, so "300"
/// yields an address the provider will reject.
fn leading_integer(text: &str) -> String {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..digits_end];

    if digits.is_empty() {
        return "NaN".to_string();
    }

    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        "0".to_string()
    } else if negative {
        format!("-{}", significant)
    } else {
        significant.to_string()
    }
}

/// VHD location of the OS disk inside the storage account
pub fn vhd_uri(storage_account: &str, os_disk_name: &str) -> String {
    format!(
        "https://{}.blob.core.windows.net/vhds/{}.vhd",
        storage_account, os_disk_name
    )
}

/// Blob endpoint receiving boot diagnostics
pub fn boot_diagnostics_uri(storage_account: &str) -> String {
    format!("https://{}.blob.core.windows.net/", storage_account)
}
