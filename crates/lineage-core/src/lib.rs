//! Lineage Core - Record types for the genealogical relationship engine
//!
//! This crate provides the individual, union and child-link records, the
//! derived relationship views, and the error kinds shared by the storage
//! and engine crates.

pub mod cancel;
pub mod error;
pub mod family;
pub mod id;
pub mod individual;
pub mod limits;
pub mod view;

pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, RecordKind, Result};
pub use family::{ChildLink, NewUnion, Union, UnionUpdate};
pub use id::{ChildLinkId, IndividualId, UnionId};
pub use individual::{Gender, Individual, IndividualUpdate, NewIndividual, ParentRole};
pub use view::{AddParentOutcome, FamilyTree, Page, Parents, ReparentFailure, Spouse, TreeNode};
