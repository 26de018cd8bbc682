use serde::{Deserialize, Serialize};

/// Which of the two independently persisted copies a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Replica {
    /// The SQL replica. Assigns identifiers and is written first.
    Relational,
    /// The document replica. Receives identifiers from the relational one.
    Document,
}

impl Replica {
    /// Returns the replica name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Replica::Relational => "relational",
            Replica::Document => "document",
        }
    }
}

impl std::fmt::Display for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
