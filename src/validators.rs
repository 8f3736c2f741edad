//! Input validation and sanitization functions for stackwall
//!
//! Ruleset files are untrusted input. Everything a file can name (tables,
//! interfaces, target names, log prefixes, port ranges) is checked here
//! before a ruleset is built from it.

/// Longest table name, matching the kernel's `XT_TABLE_MAXNAMELEN - 1`.
pub const MAX_TABLE_NAME_LEN: usize = 31;

/// Longest error target name, matching `XT_FUNCTION_MAXNAMELEN - 1`.
pub const MAX_TARGET_NAME_LEN: usize = 29;

/// Longest log prefix, matching iptables' LOG target.
pub const MAX_LOG_PREFIX_LEN: usize = 29;

/// Sanitizes a log prefix before it is written to log output.
///
/// Removes control characters, quotes, and anything outside a small ASCII
/// set, and limits the result to [`MAX_LOG_PREFIX_LEN`] characters.
///
/// # Examples
///
/// ```
/// use stackwall::validators::sanitize_log_prefix;
///
/// assert_eq!(sanitize_log_prefix("INPUT DROP: "), "INPUT DROP: ");
///
/// let safe = sanitize_log_prefix("bad\nprefix\"");
/// assert!(!safe.contains('\n'));
/// assert!(!safe.contains('"'));
/// ```
pub fn sanitize_log_prefix(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            // SECURITY: ASCII only to prevent Unicode bypasses and log injection
            c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | ':')
        })
        .take(MAX_LOG_PREFIX_LEN)
        .collect()
}

/// Validates a port range.
///
/// Port 0 is allowed so ranges such as `0:1023` can cover the whole
/// privileged block.
///
/// # Errors
///
/// Returns `Err` if the start port is greater than the end port.
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a network interface name or prefix pattern.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1), not counting a trailing `+`
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// A trailing `+` turns the name into a prefix pattern.
///
/// # Errors
///
/// Returns `Err` if the name violates kernel constraints.
pub fn validate_interface(pattern: &str) -> Result<String, String> {
    let name = pattern.strip_suffix('+').unwrap_or(pattern);

    if name.is_empty() && !pattern.ends_with('+') {
        return Err("Interface name cannot be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(pattern.to_string())
}

/// Validates a table name.
///
/// # Errors
///
/// Returns `Err` if the name is empty, too long, or contains characters
/// other than ASCII alphanumerics, `_` and `-`.
pub fn validate_table_name(name: &str) -> Result<String, String> {
    validate_identifier(name, MAX_TABLE_NAME_LEN, "Table")
}

/// Validates the name carried by an error target.
///
/// # Errors
///
/// Returns `Err` under the same conditions as [`validate_table_name`], with
/// the shorter target name limit.
pub fn validate_target_name(name: &str) -> Result<String, String> {
    validate_identifier(name, MAX_TARGET_NAME_LEN, "Target")
}

fn validate_identifier(name: &str, max_len: usize, what: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err(format!("{what} name cannot be empty"));
    }

    if name.len() > max_len {
        return Err(format!("{what} name too long (max {max_len} characters)"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "{what} name contains invalid characters (use only a-z, 0-9, _, -)"
        ));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_log_prefix_truncates() {
        let long = "x".repeat(100);
        assert_eq!(sanitize_log_prefix(&long).len(), MAX_LOG_PREFIX_LEN);
    }

    #[test]
    fn test_validate_port_range() {
        assert!(validate_port_range(0, 1023).is_ok());
        assert!(validate_port_range(22, 22).is_ok());
        assert!(validate_port_range(443, 80).is_err());
    }

    #[test]
    fn test_validate_interface() {
        assert!(validate_interface("eth0").is_ok());
        assert!(validate_interface("eth+").is_ok());
        assert!(validate_interface("+").is_ok());
        assert!(validate_interface("").is_err());
        assert!(validate_interface("..").is_err());
        assert!(validate_interface("eth0; rm -rf").is_err());
        assert!(validate_interface("averyveryverylongname").is_err());
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("filter").is_ok());
        assert!(validate_table_name("my-table_2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("../etc").is_err());
        assert!(validate_table_name(&"t".repeat(32)).is_err());
    }

    #[test]
    fn test_validate_target_name() {
        assert!(validate_target_name("ERROR").is_ok());
        assert!(validate_target_name(&"E".repeat(30)).is_err());
    }
}
