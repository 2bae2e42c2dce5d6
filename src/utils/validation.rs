//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for validating Vault role names
static ROLE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$").unwrap());

/// Regex for custom OID/UTF8 SANs in OpenSSL form: `<oid>;UTF8:<value>`
static OTHER_SAN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)+;UTF-?8:.*$").unwrap());

/// Validate a Vault role name
pub fn validate_role_name(role: &str) -> bool {
    !role.is_empty() && role.len() <= 255 && ROLE_NAME_REGEX.is_match(role)
}

/// Validate a Vault mount path
///
/// Mounts may be nested (`pki/intermediate`), so each segment is checked.
pub fn validate_mount_path(mount: &str) -> bool {
    if mount.is_empty() || mount.len() > 255 {
        return false;
    }

    mount.split('/').all(|segment| ROLE_NAME_REGEX.is_match(segment))
}

/// Validate a custom OID/UTF8 subject alternative name
pub fn validate_other_san(san: &str) -> bool {
    OTHER_SAN_REGEX.is_match(san)
}
