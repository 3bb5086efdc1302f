//! Numeric action codes.
//!
//! Action codes are stable wire/storage values: the four CRUD actions occupy
//! the low range, `save`/`submit` are flag-authorized sub-actions of `write`,
//! and application-defined actions start at [`Action::CUSTOM_BASE`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// An action that can be granted on an entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Action {
    /// Create a new entity of a class.
    Create,
    /// Read a concrete entity.
    Read,
    /// Modify a concrete entity.
    Write,
    /// Delete a concrete entity.
    Delete,
    /// Persist a draft; authorized through the `Write` grant.
    Save,
    /// Submit for processing; authorized through the `Write` grant.
    Submit,
    /// Application-defined action, code >= [`Action::CUSTOM_BASE`].
    Custom(i32),
}

impl Action {
    /// First code available to application-defined actions.
    pub const CUSTOM_BASE: i32 = 100;

    /// The stable numeric code of this action.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Create => 1,
            Self::Read => 2,
            Self::Write => 3,
            Self::Delete => 4,
            Self::Save => 51,
            Self::Submit => 52,
            Self::Custom(code) => code,
        }
    }

    /// Map a numeric code back to an action.
    ///
    /// Returns `None` for codes that are neither well-known nor in the custom
    /// range.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Create),
            2 => Some(Self::Read),
            3 => Some(Self::Write),
            4 => Some(Self::Delete),
            51 => Some(Self::Save),
            52 => Some(Self::Submit),
            c if c >= Self::CUSTOM_BASE => Some(Self::Custom(c)),
            _ => None,
        }
    }

    /// Whether this action targets a concrete entity instance rather than an
    /// entity class.
    #[must_use]
    pub fn targets_instance(self) -> bool {
        !matches!(self, Self::Create)
    }

    /// Whether this is an application-defined action.
    #[must_use]
    pub fn is_custom(self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<Action> for i32 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

impl TryFrom<i32> for Action {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown action code: {code}"))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
            Self::Save => write!(f, "save"),
            Self::Submit => write!(f, "submit"),
            Self::Custom(code) => write!(f, "custom:{code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for action in [
            Action::Create,
            Action::Read,
            Action::Write,
            Action::Delete,
            Action::Save,
            Action::Submit,
            Action::Custom(101),
        ] {
            assert_eq!(Action::from_code(action.code()), Some(action));
        }
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert_eq!(Action::from_code(0), None);
        assert_eq!(Action::from_code(5), None);
        assert_eq!(Action::from_code(99), None);
        assert_eq!(Action::from_code(-1), None);
    }

    #[test]
    fn test_custom_range() {
        assert_eq!(Action::from_code(100), Some(Action::Custom(100)));
        assert!(Action::Custom(250).is_custom());
        assert!(!Action::Write.is_custom());
    }

    #[test]
    fn test_create_targets_class() {
        assert!(!Action::Create.targets_instance());
        assert!(Action::Read.targets_instance());
        assert!(Action::Custom(120).targets_instance());
    }

    #[test]
    fn test_serde_as_code() {
        let json = serde_json::to_string(&Action::Submit).unwrap();
        assert_eq!(json, "52");
        let action: Action = serde_json::from_str("101").unwrap();
        assert_eq!(action, Action::Custom(101));
    }
}
