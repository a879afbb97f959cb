//! In-memory storage backend for testing

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;
use async_trait::async_trait;
use lineage_core::{
    ChildLink, ChildLinkId, Individual, IndividualId, NewIndividual, NewUnion, RecordKind, Union,
    UnionId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// In-memory storage backend
///
/// Useful for testing and temporary storage. Records live in ordered maps
/// so listings come back sorted by id.
pub struct MemoryStorage {
    individuals: RwLock<BTreeMap<IndividualId, Individual>>,
    unions: RwLock<BTreeMap<UnionId, Union>>,
    child_links: RwLock<Vec<ChildLink>>,
    next_individual: AtomicI64,
    next_union: AtomicI64,
    next_child_link: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            individuals: RwLock::new(BTreeMap::new()),
            unions: RwLock::new(BTreeMap::new()),
            child_links: RwLock::new(Vec::new()),
            next_individual: AtomicI64::new(1),
            next_union: AtomicI64::new(1),
            next_child_link: AtomicI64::new(1),
        }
    }

    /// Overwrite an individual without any checks.
    ///
    /// Lets tests plant records that the engine would refuse to write, such
    /// as ancestry cycles.
    pub fn put_individual(&self, individual: Individual) -> StorageResult<()> {
        let mut individuals = self.individuals.write().map_err(StorageError::lock)?;
        self.next_individual
            .fetch_max(individual.id.get() + 1, Ordering::SeqCst);
        individuals.insert(individual.id, individual);
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    // Individual operations

    async fn create_individual(&self, draft: &NewIndividual) -> StorageResult<Individual> {
        let mut individuals = self.individuals.write().map_err(StorageError::lock)?;
        let id = IndividualId(self.next_individual.fetch_add(1, Ordering::SeqCst));
        let individual = Individual::from_draft(id, draft);
        individuals.insert(id, individual.clone());
        Ok(individual)
    }

    async fn get_individual(&self, id: IndividualId) -> StorageResult<Option<Individual>> {
        let individuals = self.individuals.read().map_err(StorageError::lock)?;
        Ok(individuals.get(&id).cloned())
    }

    async fn update_individual(&self, individual: &Individual) -> StorageResult<()> {
        let mut individuals = self.individuals.write().map_err(StorageError::lock)?;
        match individuals.get_mut(&individual.id) {
            Some(slot) => {
                *slot = individual.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(
                RecordKind::Individual,
                individual.id.get(),
            )),
        }
    }

    async fn delete_individual(&self, id: IndividualId) -> StorageResult<()> {
        let mut individuals = self.individuals.write().map_err(StorageError::lock)?;
        individuals
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(RecordKind::Individual, id.get()))
    }

    async fn children_of(&self, parent: IndividualId) -> StorageResult<Vec<Individual>> {
        let individuals = self.individuals.read().map_err(StorageError::lock)?;
        Ok(individuals
            .values()
            .filter(|i| i.is_child_of(parent))
            .cloned()
            .collect())
    }

    async fn search_individuals(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<(Vec<Individual>, usize)> {
        let individuals = self.individuals.read().map_err(StorageError::lock)?;
        let matches: Vec<&Individual> = individuals
            .values()
            .filter(|i| i.matches_text(text))
            .collect();
        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    // Union operations

    async fn create_union(&self, draft: &NewUnion, marriage_order: u32) -> StorageResult<Union> {
        let mut unions = self.unions.write().map_err(StorageError::lock)?;
        let id = UnionId(self.next_union.fetch_add(1, Ordering::SeqCst));
        let union = Union::from_draft(id, draft, marriage_order);
        unions.insert(id, union.clone());
        Ok(union)
    }

    async fn get_union(&self, id: UnionId) -> StorageResult<Option<Union>> {
        let unions = self.unions.read().map_err(StorageError::lock)?;
        Ok(unions.get(&id).cloned())
    }

    async fn update_union(&self, union: &Union) -> StorageResult<()> {
        let mut unions = self.unions.write().map_err(StorageError::lock)?;
        match unions.get_mut(&union.id) {
            Some(slot) => {
                *slot = union.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(RecordKind::Union, union.id.get())),
        }
    }

    async fn delete_union(&self, id: UnionId) -> StorageResult<()> {
        let mut unions = self.unions.write().map_err(StorageError::lock)?;
        unions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(RecordKind::Union, id.get()))
    }

    async fn unions_of(&self, individual: IndividualId) -> StorageResult<Vec<Union>> {
        let unions = self.unions.read().map_err(StorageError::lock)?;
        Ok(unions
            .values()
            .filter(|u| u.involves(individual))
            .cloned()
            .collect())
    }

    // Child link operations

    async fn create_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
    ) -> StorageResult<ChildLink> {
        let mut links = self.child_links.write().map_err(StorageError::lock)?;
        let id = ChildLinkId(self.next_child_link.fetch_add(1, Ordering::SeqCst));
        let link = ChildLink::new(id, union_id, child, relationship);
        links.push(link.clone());
        Ok(link)
    }

    async fn delete_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
    ) -> StorageResult<bool> {
        let mut links = self.child_links.write().map_err(StorageError::lock)?;
        let before = links.len();
        links.retain(|l| !(l.union_id == union_id && l.individual_id == child));
        Ok(links.len() != before)
    }

    async fn child_links_of_union(&self, union_id: UnionId) -> StorageResult<Vec<ChildLink>> {
        let links = self.child_links.read().map_err(StorageError::lock)?;
        Ok(links
            .iter()
            .filter(|l| l.union_id == union_id)
            .cloned()
            .collect())
    }

    async fn child_links_of_individual(
        &self,
        individual: IndividualId,
    ) -> StorageResult<Vec<ChildLink>> {
        let links = self.child_links.read().map_err(StorageError::lock)?;
        Ok(links
            .iter()
            .filter(|l| l.individual_id == individual)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::Gender;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();

        let father = storage
            .create_individual(&NewIndividual::new("Jan", Gender::Male))
            .await
            .unwrap();
        let child = storage
            .create_individual(&NewIndividual::new("Piotr", Gender::Male).with_father(father.id))
            .await
            .unwrap();
        assert_eq!(father.id, IndividualId(1));
        assert_eq!(child.id, IndividualId(2));

        let children = storage.children_of(father.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].full_name, "Piotr");

        let mut renamed = child.clone();
        renamed.full_name = "Piotr Jan".into();
        storage.update_individual(&renamed).await.unwrap();
        let fetched = storage.get_individual(child.id).await.unwrap().unwrap();
        assert_eq!(fetched.full_name, "Piotr Jan");

        storage.delete_individual(child.id).await.unwrap();
        assert!(storage.get_individual(child.id).await.unwrap().is_none());
        assert!(matches!(
            storage.delete_individual(child.id).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unions_and_links() {
        let storage = MemoryStorage::new();
        let union = storage
            .create_union(&NewUnion::between(IndividualId(1), IndividualId(2)), 1)
            .await
            .unwrap();
        assert_eq!(union.marriage_order, 1);
        assert_eq!(storage.unions_of(IndividualId(2)).await.unwrap().len(), 1);
        assert!(storage.unions_of(IndividualId(3)).await.unwrap().is_empty());

        storage
            .create_child_link(union.id, IndividualId(3), "son")
            .await
            .unwrap();
        assert_eq!(storage.child_links_of_union(union.id).await.unwrap().len(), 1);
        assert_eq!(
            storage.child_links_of_individual(IndividualId(3)).await.unwrap()[0].relationship,
            "son"
        );

        assert!(storage.delete_child_link(union.id, IndividualId(3)).await.unwrap());
        assert!(!storage.delete_child_link(union.id, IndividualId(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_paging() {
        let storage = MemoryStorage::new();
        for i in 0..15 {
            storage
                .create_individual(&NewIndividual::new(format!("Nowak {}", i), Gender::Unknown))
                .await
                .unwrap();
        }
        storage
            .create_individual(&NewIndividual::new("Kowalska", Gender::Female))
            .await
            .unwrap();

        let (page, total) = storage.search_individuals("nowak", 10, 10).await.unwrap();
        assert_eq!(total, 15);
        assert_eq!(page.len(), 5);

        let (all, total) = storage.search_individuals("", 100, 0).await.unwrap();
        assert_eq!(total, 16);
        assert_eq!(all.len(), 16);
    }
}
