//! Command validation results.
//!
//! Commands report validation as data, never as `Err`. A
//! [`CommandErrorMessage`] carries a success flag plus a
//! [`LocalizableString`] the UI can translate. Results compose from named
//! sub-checks: all must pass for the combined result to succeed.

use serde::{Deserialize, Serialize};

/// A translation key plus positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizableString {
    /// Translation key, e.g. `command.insufficient_storage`.
    pub key: String,
    /// Positional arguments substituted into the translated text.
    pub args: Vec<String>,
}

impl LocalizableString {
    /// A key with no arguments.
    pub fn new(key: &str) -> Self {
        Self {
            key: String::from(key),
            args: Vec::new(),
        }
    }

    /// A key with positional arguments.
    pub fn with_args<I, S>(key: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: String::from(key),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this string carries no key.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl core::fmt::Display for LocalizableString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}({})", self.key, self.args.join(", "))
        }
    }
}

/// One named sub-check of a command validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCheck {
    /// What was checked; reported when the check fails.
    pub name: LocalizableString,
    /// Whether the check passed.
    pub passed: bool,
}

impl NamedCheck {
    /// Build a check from a key and its outcome.
    pub fn new(key: &str, passed: bool) -> Self {
        Self {
            name: LocalizableString::new(key),
            passed,
        }
    }
}

/// Outcome of a command's self-check or target-side check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandErrorMessage {
    /// Whether the check passed.
    pub success: bool,
    /// Reason for failure; empty on success.
    pub error_message: LocalizableString,
}

/// Key used when combining several failed sub-checks into one message.
pub const FAILED_CHECKS_KEY: &str = "command.failed_checks";

impl CommandErrorMessage {
    /// A passing result.
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: LocalizableString::default(),
        }
    }

    /// A failing result with a reason.
    pub const fn failure(error_message: LocalizableString) -> Self {
        Self {
            success: false,
            error_message,
        }
    }

    /// Combine named sub-checks. Succeeds only if every check passed; on
    /// failure the message lists the keys of the failed checks in order.
    pub fn from_checks<I>(checks: I) -> Self
    where
        I: IntoIterator<Item = NamedCheck>,
    {
        let failed: Vec<String> = checks
            .into_iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.key)
            .collect();
        if failed.is_empty() {
            Self::ok()
        } else {
            Self::failure(LocalizableString::with_args(FAILED_CHECKS_KEY, failed))
        }
    }

    /// Combine two results. The first failure wins.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        if self.success { other } else { self }
    }
}

impl core::fmt::Display for CommandErrorMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.success {
            write!(f, "ok")
        } else {
            write!(f, "failed: {}", self.error_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_passing_checks_succeed() {
        let r = CommandErrorMessage::from_checks([
            NamedCheck::new("check.a", true),
            NamedCheck::new("check.b", true),
        ]);
        assert!(r.success);
        assert!(r.error_message.is_empty());
    }

    #[test]
    fn failing_checks_are_listed_in_order() {
        let r = CommandErrorMessage::from_checks([
            NamedCheck::new("check.a", false),
            NamedCheck::new("check.b", true),
            NamedCheck::new("check.c", false),
        ]);
        assert!(!r.success);
        assert_eq!(r.error_message.key, FAILED_CHECKS_KEY);
        assert_eq!(r.error_message.args, vec!["check.a", "check.c"]);
    }

    #[test]
    fn no_checks_is_success() {
        assert!(CommandErrorMessage::from_checks(Vec::<NamedCheck>::new()).success);
    }

    #[test]
    fn and_keeps_first_failure() {
        let first = CommandErrorMessage::failure(LocalizableString::new("first"));
        let second = CommandErrorMessage::failure(LocalizableString::new("second"));
        assert_eq!(first.clone().and(second.clone()), first);
        assert_eq!(CommandErrorMessage::ok().and(second.clone()), second);
    }

    #[test]
    fn display_includes_args() {
        let s = LocalizableString::with_args("command.too_far", ["3", "2"]);
        assert_eq!(s.to_string(), "command.too_far(3, 2)");
        let r = CommandErrorMessage::failure(s);
        assert_eq!(r.to_string(), "failed: command.too_far(3, 2)");
    }
}
