//! Verdicts produced while walking rules and tables

/// Outcome of evaluating a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum RuleVerdict {
    /// Packet is accepted by the current table
    #[strum(serialize = "ACCEPT")]
    Accept,
    /// Packet is dropped
    #[strum(serialize = "DROP")]
    Drop,
    /// Rule did not decide; evaluate the next rule
    #[strum(serialize = "CONTINUE")]
    Continue,
    /// Stop walking the chain and defer to its underflow policy
    #[strum(serialize = "RETURN")]
    Return,
}

/// Outcome of evaluating a table.
///
/// Only two outcomes exist, so the engine loop has no illegal state to
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TableVerdict {
    #[strum(serialize = "ACCEPT")]
    Accept,
    #[strum(serialize = "DROP")]
    Drop,
}

impl RuleVerdict {
    /// Narrows a rule verdict to a table verdict.
    ///
    /// Returns `None` for `Continue` and `Return`, which are not decisions.
    pub const fn decision(self) -> Option<TableVerdict> {
        match self {
            RuleVerdict::Accept => Some(TableVerdict::Accept),
            RuleVerdict::Drop => Some(TableVerdict::Drop),
            RuleVerdict::Continue | RuleVerdict::Return => None,
        }
    }
}
