//! Storage backend trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use lineage_core::{
    ChildLink, Individual, IndividualId, NewIndividual, NewUnion, Union, UnionId,
};

/// Trait for storage backend implementations
///
/// Backends assign integer ids on creation and hand out owned copies of
/// their records; callers re-write records whole through the `update_*`
/// methods.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn initialize(&self) -> StorageResult<()>;

    /// Close the storage connection
    async fn close(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Individual Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an individual and return it with its assigned id
    async fn create_individual(&self, draft: &NewIndividual) -> StorageResult<Individual>;

    /// Get an individual by id
    async fn get_individual(&self, id: IndividualId) -> StorageResult<Option<Individual>>;

    /// Replace a stored individual; fails with `NotFound` if absent
    async fn update_individual(&self, individual: &Individual) -> StorageResult<()>;

    /// Delete an individual; fails with `NotFound` if absent
    async fn delete_individual(&self, id: IndividualId) -> StorageResult<()>;

    /// Individuals whose father or mother is `parent`, ordered by id
    async fn children_of(&self, parent: IndividualId) -> StorageResult<Vec<Individual>>;

    /// Substring search over name and notes, returning one page and the total
    async fn search_individuals(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<(Vec<Individual>, usize)>;

    // ─────────────────────────────────────────────────────────────────────────
    // Union Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a union with an already-computed marriage order
    async fn create_union(&self, draft: &NewUnion, marriage_order: u32) -> StorageResult<Union>;

    /// Get a union by id
    async fn get_union(&self, id: UnionId) -> StorageResult<Option<Union>>;

    /// Replace a stored union; fails with `NotFound` if absent
    async fn update_union(&self, union: &Union) -> StorageResult<()>;

    /// Delete a union; fails with `NotFound` if absent
    async fn delete_union(&self, id: UnionId) -> StorageResult<()>;

    /// Unions where the individual is husband or wife, ordered by id
    async fn unions_of(&self, individual: IndividualId) -> StorageResult<Vec<Union>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Child Link Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Link a child to a union
    async fn create_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
    ) -> StorageResult<ChildLink>;

    /// Remove the link between a union and a child; returns whether one existed
    async fn delete_child_link(&self, union_id: UnionId, child: IndividualId)
        -> StorageResult<bool>;

    /// Child links owned by a union
    async fn child_links_of_union(&self, union_id: UnionId) -> StorageResult<Vec<ChildLink>>;

    /// Child links naming the individual as the child
    async fn child_links_of_individual(
        &self,
        individual: IndividualId,
    ) -> StorageResult<Vec<ChildLink>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Derived Lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Get an individual, failing with `NotFound` if absent
    async fn require_individual(&self, id: IndividualId) -> StorageResult<Individual> {
        self.get_individual(id).await?.ok_or_else(|| {
            crate::StorageError::not_found(lineage_core::RecordKind::Individual, id.get())
        })
    }

    /// Get a union, failing with `NotFound` if absent
    async fn require_union(&self, id: UnionId) -> StorageResult<Union> {
        self.get_union(id)
            .await?
            .ok_or_else(|| crate::StorageError::not_found(lineage_core::RecordKind::Union, id.get()))
    }
}
