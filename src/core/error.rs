use crate::core::hook::Hook;
use thiserror::Error;

/// Core error types for stackwall
///
/// Everything except `Io` and `Serialization` describes a broken ruleset.
/// These are detected once, when a configuration is installed, and never on
/// the packet path.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A hook's priority list names a table that does not exist
    #[error("Hook {hook} references unknown table '{table}'")]
    UnknownTable { hook: Hook, table: String },

    /// A table is consulted at a hook but has no entry point there
    #[error("Table '{table}' is listed for hook {hook} but its built-in chain is unset")]
    UnsetBuiltinChain { table: String, hook: Hook },

    /// A table is consulted at a hook but has no default policy there
    #[error("Table '{table}' is listed for hook {hook} but its underflow is unset")]
    UnsetUnderflow { table: String, hook: Hook },

    /// An entry or underflow index points past the end of the rules
    #[error("Table '{table}' hook {hook}: rule index {index} out of range ({len} rules)")]
    RuleIndexOutOfRange {
        table: String,
        hook: Hook,
        index: usize,
        len: usize,
    },

    /// Underflow rule carries a protocol filter or matchers
    #[error("Table '{table}' hook {hook}: underflow rule {index} is not unconditional")]
    UnderflowNotUnconditional {
        table: String,
        hook: Hook,
        index: usize,
    },

    /// Underflow rule's target does not yield a fixed accept or drop
    #[error(
        "Table '{table}' hook {hook}: underflow rule {index} has target {target}, expected ACCEPT or DROP"
    )]
    UnderflowNotPolicy {
        table: String,
        hook: Hook,
        index: usize,
        target: String,
    },

    /// A built-in chain can fall into the error sentinel
    #[error(
        "Table '{table}' hook {hook}: error target at rule {index} is reachable from the chain entry"
    )]
    ErrorSentinelReachable {
        table: String,
        hook: Hook,
        index: usize,
    },

    /// A table holds more rules than a ruleset file may carry
    #[error("Table '{table}' contains {count} rules (max: {max})")]
    TooManyRules {
        table: String,
        count: usize,
        max: usize,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },
}

impl Error {
    /// Returns `true` if the error describes a broken ruleset rather than a
    /// failure to read or write one.
    pub fn is_config_violation(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_table_and_hook() {
        let err = Error::UnsetBuiltinChain {
            table: "filter".to_string(),
            hook: Hook::Input,
        };
        let msg = err.to_string();
        assert!(msg.contains("filter"));
        assert!(msg.contains("input"));
    }

    #[test]
    fn test_underflow_policy_message() {
        let err = Error::UnderflowNotPolicy {
            table: "nat".to_string(),
            hook: Hook::Output,
            index: 2,
            target: "RETURN".to_string(),
        };
        assert!(err.to_string().contains("RETURN"));
        assert!(err.is_config_violation());
    }

    #[test]
    fn test_io_is_not_config_violation() {
        let err = Error::from(std::io::Error::other("disk"));
        assert!(!err.is_config_violation());
    }
}
