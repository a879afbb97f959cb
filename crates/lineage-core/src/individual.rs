//! Individual (person) records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::IndividualId;

/// Gender of an individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// Parental role of an individual relative to a child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentRole {
    Father,
    Mother,
}

impl ParentRole {
    /// Gender a parent in this role must have
    pub fn required_gender(&self) -> Gender {
        match self {
            Self::Father => Gender::Male,
            Self::Mother => Gender::Female,
        }
    }

    /// The other parental role
    pub fn other(&self) -> Self {
        match self {
            Self::Father => Self::Mother,
            Self::Mother => Self::Father,
        }
    }
}

impl std::fmt::Display for ParentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Father => write!(f, "father"),
            Self::Mother => write!(f, "mother"),
        }
    }
}

impl std::str::FromStr for ParentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "father" => Ok(Self::Father),
            "mother" => Ok(Self::Mother),
            other => Err(format!("parent role must be 'father' or 'mother', got '{}'", other)),
        }
    }
}

/// A person in the family graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Identifier assigned by storage
    pub id: IndividualId,

    pub full_name: String,

    #[serde(default)]
    pub gender: Gender,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_place: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_place: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,

    /// Weak reference to the father
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_id: Option<IndividualId>,

    /// Weak reference to the mother
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_id: Option<IndividualId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Individual {
    /// Materialize a draft under a storage-assigned id
    pub fn from_draft(id: IndividualId, draft: &NewIndividual) -> Self {
        let now = Utc::now();
        Self {
            id,
            full_name: draft.full_name.clone(),
            gender: draft.gender,
            birth_date: draft.birth_date,
            birth_place: draft.birth_place.clone(),
            death_date: draft.death_date,
            death_place: draft.death_place.clone(),
            occupation: draft.occupation.clone(),
            notes: draft.notes.clone(),
            photo_url: draft.photo_url.clone(),
            father_id: draft.father_id,
            mother_id: draft.mother_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parent(&self, role: ParentRole) -> Option<IndividualId> {
        match role {
            ParentRole::Father => self.father_id,
            ParentRole::Mother => self.mother_id,
        }
    }

    pub fn set_parent(&mut self, role: ParentRole, parent: Option<IndividualId>) {
        match role {
            ParentRole::Father => self.father_id = parent,
            ParentRole::Mother => self.mother_id = parent,
        }
        self.updated_at = Utc::now();
    }

    /// Known parent ids, father first
    pub fn parent_ids(&self) -> impl Iterator<Item = IndividualId> {
        self.father_id.into_iter().chain(self.mother_id)
    }

    pub fn is_child_of(&self, parent: IndividualId) -> bool {
        self.father_id == Some(parent) || self.mother_id == Some(parent)
    }

    /// Case-insensitive substring match over name and notes
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        self.full_name.to_lowercase().contains(&needle)
            || self
                .notes
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, changes: &IndividualUpdate) {
        if let Some(name) = &changes.full_name {
            self.full_name = name.clone();
        }
        if let Some(gender) = changes.gender {
            self.gender = gender;
        }
        if let Some(v) = changes.birth_date {
            self.birth_date = v;
        }
        if let Some(v) = &changes.birth_place {
            self.birth_place = v.clone();
        }
        if let Some(v) = changes.death_date {
            self.death_date = v;
        }
        if let Some(v) = &changes.death_place {
            self.death_place = v.clone();
        }
        if let Some(v) = &changes.occupation {
            self.occupation = v.clone();
        }
        if let Some(v) = &changes.notes {
            self.notes = v.clone();
        }
        if let Some(v) = &changes.photo_url {
            self.photo_url = v.clone();
        }
        if let Some(v) = changes.father_id {
            self.father_id = v;
        }
        if let Some(v) = changes.mother_id {
            self.mother_id = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Data for creating a new individual
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIndividual {
    pub full_name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub death_date: Option<NaiveDate>,
    #[serde(default)]
    pub death_place: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub father_id: Option<IndividualId>,
    #[serde(default)]
    pub mother_id: Option<IndividualId>,
}

impl NewIndividual {
    pub fn new(full_name: impl Into<String>, gender: Gender) -> Self {
        Self {
            full_name: full_name.into(),
            gender,
            ..Default::default()
        }
    }

    pub fn with_father(mut self, father: IndividualId) -> Self {
        self.father_id = Some(father);
        self
    }

    pub fn with_mother(mut self, mother: IndividualId) -> Self {
        self.mother_id = Some(mother);
        self
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_death_date(mut self, date: NaiveDate) -> Self {
        self.death_date = Some(date);
        self
    }

    pub fn with_occupation(mut self, occupation: impl Into<String>) -> Self {
        self.occupation = Some(occupation.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Partial update of an individual.
///
/// Outer `None` leaves a field unchanged; for nullable fields `Some(None)`
/// clears it.
#[derive(Debug, Clone, Default)]
pub struct IndividualUpdate {
    pub full_name: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<Option<NaiveDate>>,
    pub birth_place: Option<Option<String>>,
    pub death_date: Option<Option<NaiveDate>>,
    pub death_place: Option<Option<String>>,
    pub occupation: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub photo_url: Option<Option<String>>,
    pub father_id: Option<Option<IndividualId>>,
    pub mother_id: Option<Option<IndividualId>>,
}

impl IndividualUpdate {
    pub fn parent(&self, role: ParentRole) -> Option<Option<IndividualId>> {
        match role {
            ParentRole::Father => self.father_id,
            ParentRole::Mother => self.mother_id,
        }
    }

    pub fn with_parent(mut self, role: ParentRole, parent: IndividualId) -> Self {
        match role {
            ParentRole::Father => self.father_id = Some(Some(parent)),
            ParentRole::Mother => self.mother_id = Some(Some(parent)),
        }
        self
    }
}
