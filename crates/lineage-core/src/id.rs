//! Integer identifiers assigned by the persistence layer

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of an individual
    IndividualId
);

record_id!(
    /// Identifier of a union (family)
    UnionId
);

record_id!(
    /// Identifier of a child link
    ChildLinkId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_integers() {
        let id = IndividualId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: UnionId = serde_json::from_str("12").unwrap();
        assert_eq!(back, UnionId(12));
        assert_eq!(back.to_string(), "12");
    }
}
