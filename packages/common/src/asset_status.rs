use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Processing status of an uploaded asset.
///
/// Persisted as a plain string column. Unrecognized strings decode to
/// [`AssetStatus::Unknown`] instead of failing, both from the database and from the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Original stored and task published; waiting for a worker.
    Uploaded,
    /// A worker picked up the task.
    Processing,
    /// Processed output stored and described.
    Completed,
    /// Processing gave up.
    Failed,
    /// Anything the store returned that we do not recognize.
    Unknown,
}

impl AssetStatus {
    /// All statuses a record can legitimately hold.
    pub const ALL: &'static [AssetStatus] = &[
        Self::Uploaded,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses a record must currently hold for a write of `self` to apply.
    ///
    /// `Completed` accepts itself so a redelivered task can rewrite identical terminal state.
    /// `Uploaded` has no predecessors: it is only ever written on create.
    pub fn predecessors(&self) -> &'static [AssetStatus] {
        match self {
            Self::Uploaded | Self::Unknown => &[],
            Self::Processing => &[Self::Uploaded],
            Self::Completed => &[Self::Processing, Self::Completed],
            Self::Failed => &[Self::Uploaded, Self::Processing],
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotone.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        next.predecessors().contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Lossy parse: unrecognized values become `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "uploaded" => Self::Uploaded,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AssetStatus {
    fn default() -> Self {
        Self::Uploaded
    }
}

impl From<&str> for AssetStatus {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for AssetStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip() {
        for status in AssetStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            let parsed: AssetStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, parsed);
        }
        assert_eq!(
            serde_json::to_string(&AssetStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_unrecognized_decodes_to_unknown() {
        assert_eq!(AssetStatus::parse("archived"), AssetStatus::Unknown);
        assert_eq!(AssetStatus::parse("Completed"), AssetStatus::Unknown);
        let parsed: AssetStatus = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(parsed, AssetStatus::Unknown);
    }

    #[test]
    fn test_transitions_are_monotone() {
        use AssetStatus::*;

        assert!(Uploaded.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Uploaded));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Uploaded));
        assert!(!Unknown.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal() {
        assert!(AssetStatus::Completed.is_terminal());
        assert!(AssetStatus::Failed.is_terminal());
        assert!(!AssetStatus::Uploaded.is_terminal());
        assert!(!AssetStatus::Processing.is_terminal());
    }
}
