//! Record identifiers
//!
//! Ids are UUID v7 (time-sortable), assigned once by whoever creates the
//! record and never reassigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique ID using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s.trim())?))
            }
        }
    };
}

record_id!(
    /// Identifier of a [`super::Project`]
    ProjectId
);
record_id!(
    /// Identifier of a [`super::Snippet`]
    SnippetId
);
record_id!(
    /// Identifier of a [`super::Knowledge`] item
    KnowledgeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(SnippetId::new(), SnippetId::new());
    }

    #[test]
    fn id_parse_roundtrip() {
        let id = ProjectId::new();
        let parsed: ProjectId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<KnowledgeId>().is_err());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id: SnippetId = "cccccccc-cccc-7ccc-8ccc-111111111111".parse().unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"cccccccc-cccc-7ccc-8ccc-111111111111\""
        );
    }
}
