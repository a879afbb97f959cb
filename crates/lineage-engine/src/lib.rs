//! Lineage Engine - Genealogical relationship engine
//!
//! This crate validates and applies mutations to a family graph of
//! individuals and unions, resolves relationship views over it, and serves
//! reads through an optional cache. [`FamilyEngine`] is the entry point;
//! build one with [`FamilyEngineBuilder`] from explicit storage and cache
//! collaborators.

pub mod cache;
pub mod config;
pub mod engine;
pub mod individuals;
pub mod marriage;
pub mod relations;
pub mod tree;
pub mod validator;

pub use cache::{CacheLayer, CacheTicket};
pub use config::EngineConfig;
pub use engine::{FamilyEngine, FamilyEngineBuilder};
pub use individuals::IndividualManager;
pub use marriage::{HusbandGuard, HusbandLocks, UnionManager};
pub use relations::RelationshipQueries;
pub use tree::TreeMaterializer;
pub use validator::ConsistencyValidator;
