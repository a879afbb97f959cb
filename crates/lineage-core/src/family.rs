//! Union (family) and child-link records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChildLinkId, IndividualId, UnionId};

/// A marital or partnership record between up to two individuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Union {
    /// Identifier assigned by storage
    pub id: UnionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub husband_id: Option<IndividualId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wife_id: Option<IndividualId>,

    /// 1-based rank among the husband's unions, in creation order
    pub marriage_order: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marriage_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divorce_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Union {
    /// Materialize a draft under a storage-assigned id
    pub fn from_draft(id: UnionId, draft: &NewUnion, marriage_order: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            husband_id: draft.husband_id,
            wife_id: draft.wife_id,
            marriage_order,
            marriage_date: draft.marriage_date,
            divorce_date: draft.divorce_date,
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the individual is husband or wife in this union
    pub fn involves(&self, individual: IndividualId) -> bool {
        self.husband_id == Some(individual) || self.wife_id == Some(individual)
    }

    /// The other party of the union, seen from `individual`
    pub fn partner_of(&self, individual: IndividualId) -> Option<IndividualId> {
        if self.husband_id == Some(individual) {
            self.wife_id
        } else if self.wife_id == Some(individual) {
            self.husband_id
        } else {
            None
        }
    }

    /// Whether the union joins exactly these two individuals, in either role
    pub fn is_between(&self, a: IndividualId, b: IndividualId) -> bool {
        (self.husband_id == Some(a) && self.wife_id == Some(b))
            || (self.husband_id == Some(b) && self.wife_id == Some(a))
    }

    /// Known party ids, husband first
    pub fn party_ids(&self) -> impl Iterator<Item = IndividualId> {
        self.husband_id.into_iter().chain(self.wife_id)
    }

    /// Apply a partial update in place; marriage order is left to the caller
    pub fn apply(&mut self, changes: &UnionUpdate) {
        if let Some(v) = changes.husband_id {
            self.husband_id = v;
        }
        if let Some(v) = changes.wife_id {
            self.wife_id = v;
        }
        if let Some(v) = changes.marriage_date {
            self.marriage_date = v;
        }
        if let Some(v) = changes.divorce_date {
            self.divorce_date = v;
        }
        if let Some(v) = &changes.notes {
            self.notes = v.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Data for creating a new union
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUnion {
    #[serde(default)]
    pub husband_id: Option<IndividualId>,
    #[serde(default)]
    pub wife_id: Option<IndividualId>,
    #[serde(default)]
    pub marriage_date: Option<NaiveDate>,
    #[serde(default)]
    pub divorce_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewUnion {
    pub fn new(husband_id: Option<IndividualId>, wife_id: Option<IndividualId>) -> Self {
        Self {
            husband_id,
            wife_id,
            ..Default::default()
        }
    }

    pub fn between(husband: IndividualId, wife: IndividualId) -> Self {
        Self::new(Some(husband), Some(wife))
    }

    pub fn with_marriage_date(mut self, date: NaiveDate) -> Self {
        self.marriage_date = Some(date);
        self
    }

    pub fn with_divorce_date(mut self, date: NaiveDate) -> Self {
        self.divorce_date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Partial update of a union; `Some(None)` clears a nullable field
#[derive(Debug, Clone, Default)]
pub struct UnionUpdate {
    pub husband_id: Option<Option<IndividualId>>,
    pub wife_id: Option<Option<IndividualId>>,
    pub marriage_date: Option<Option<NaiveDate>>,
    pub divorce_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

/// Association of a child with the union that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLink {
    pub id: ChildLinkId,

    /// Owning union
    pub union_id: UnionId,

    /// The child
    pub individual_id: IndividualId,

    /// Free text, e.g. "biological son"
    #[serde(default)]
    pub relationship: String,

    pub created_at: DateTime<Utc>,
}

impl ChildLink {
    pub fn new(
        id: ChildLinkId,
        union_id: UnionId,
        individual_id: IndividualId,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            id,
            union_id,
            individual_id,
            relationship: relationship.into(),
            created_at: Utc::now(),
        }
    }
}
