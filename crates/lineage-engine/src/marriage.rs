//! Union management: creation, spouses, marriage order and child links

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lineage_core::limits::{validate_id, validate_label, validate_text};
use lineage_core::{
    ChildLink, Error, Gender, IndividualId, NewUnion, RecordKind, Result, Union, UnionId,
    UnionUpdate,
};
use lineage_storage::StorageBackend;
use tokio::sync::OwnedMutexGuard;

use crate::validator::ConsistencyValidator;

/// One async mutex per husband, held while a marriage order is read and written.
///
/// Entries live only while a guard is held or awaited.
#[derive(Default)]
pub struct HusbandLocks {
    locks: Mutex<HashMap<IndividualId, Arc<tokio::sync::Mutex<()>>>>,
}

impl HusbandLocks {
    pub async fn acquire(&self, husband: IndividualId) -> Result<HusbandGuard<'_>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| Error::Storage(format!("Lock error: {}", e)))?;
            locks.entry(husband).or_default().clone()
        };
        Ok(HusbandGuard {
            guard: Some(lock.lock_owned().await),
            husband,
            locks: self,
        })
    }

    /// Number of husbands with a lock currently held or awaited
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn release(&self, husband: IndividualId) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // The map's reference is the last one once nobody holds or awaits it
        if locks
            .get(&husband)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&husband);
        }
    }
}

/// Held marriage-order lock; dropping it releases the lock and forgets idle entries
pub struct HusbandGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    husband: IndividualId,
    locks: &'a HusbandLocks,
}

impl Drop for HusbandGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.husband);
    }
}

/// Creates and maintains unions and their child links
#[derive(Clone)]
pub struct UnionManager {
    storage: Arc<dyn StorageBackend>,
    validator: ConsistencyValidator,
    locks: Arc<HusbandLocks>,
    allow_reparenting: bool,
}

impl UnionManager {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        validator: ConsistencyValidator,
        allow_reparenting: bool,
    ) -> Self {
        Self {
            storage,
            validator,
            locks: Arc::new(HusbandLocks::default()),
            allow_reparenting,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unions
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a union, assigning the husband's next marriage order
    pub async fn create_union(&self, draft: &NewUnion) -> Result<Union> {
        validate_text("notes", draft.notes.as_deref())?;
        self.validator
            .validate_union(draft.husband_id, draft.wife_id)
            .await?;

        let _guard = match draft.husband_id {
            Some(husband) => Some(self.locks.acquire(husband).await?),
            None => None,
        };
        self.insert_union(draft).await
    }

    /// Add a union between two individuals, inferring roles from gender
    pub async fn add_spouse(&self, individual: IndividualId, spouse: IndividualId) -> Result<Union> {
        validate_id("individual_id", individual.get())?;
        validate_id("spouse_id", spouse.get())?;
        let a = self.require_individual(individual).await?;
        let b = self.require_individual(spouse).await?;

        let (husband, wife) = match (a.gender, b.gender) {
            (Gender::Male, Gender::Female) => (a.id, b.id),
            (Gender::Female, Gender::Male) => (b.id, a.id),
            _ => {
                return Err(Error::InvalidRelation(format!(
                    "a union needs one male and one female, got {} ({}) and {} ({})",
                    a.id, a.gender, b.id, b.gender
                )))
            }
        };

        let _guard = self.locks.acquire(husband).await?;
        if let Some(existing) = self.find_union_between(husband, wife).await? {
            return Err(Error::AlreadyExists(format!(
                "union {} already joins {} and {}",
                existing.id, husband, wife
            )));
        }
        self.insert_union(&NewUnion::between(husband, wife)).await
    }

    /// Return the union between a father and a mother, creating it if absent
    pub async fn ensure_union(&self, father: IndividualId, mother: IndividualId) -> Result<Union> {
        self.validator
            .validate_union(Some(father), Some(mother))
            .await?;

        let _guard = self.locks.acquire(father).await?;
        if let Some(existing) = self.find_union_between(father, mother).await? {
            return Ok(existing);
        }
        let draft =
            NewUnion::between(father, mother).with_notes("Created automatically for shared children");
        self.insert_union(&draft).await
    }

    pub async fn get_union(&self, id: UnionId) -> Result<Union> {
        validate_id("union_id", id.get())?;
        self.storage
            .get_union(id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Union, id))
    }

    /// Apply a partial update.
    ///
    /// The marriage order is kept unless the husband changes, in which case
    /// the union takes the new husband's next order.
    pub async fn update_union(&self, id: UnionId, changes: &UnionUpdate) -> Result<Union> {
        let current = self.get_union(id).await?;
        let mut updated = current.clone();
        updated.apply(changes);
        validate_text("notes", updated.notes.as_deref())?;
        self.validator
            .validate_union(updated.husband_id, updated.wife_id)
            .await?;

        let _guard = match updated.husband_id {
            Some(husband) if updated.husband_id != current.husband_id => {
                let guard = self.locks.acquire(husband).await?;
                updated.marriage_order = self.next_marriage_order(husband).await?;
                Some(guard)
            }
            _ => None,
        };

        self.storage.update_union(&updated).await?;
        tracing::info!("Updated union {}", id);
        Ok(updated)
    }

    /// Delete a union that no longer has children linked to it
    pub async fn delete_union(&self, id: UnionId) -> Result<Union> {
        let union = self.get_union(id).await?;
        let links = self.storage.child_links_of_union(id).await?;
        if !links.is_empty() {
            return Err(Error::HasChildren(format!(
                "union {} still has {} child link(s); remove them first",
                id,
                links.len()
            )));
        }

        self.storage.delete_union(id).await?;
        tracing::info!("Deleted union {}", id);
        Ok(union)
    }

    /// Unions where the individual is husband or wife
    pub async fn unions_of(&self, individual: IndividualId) -> Result<Vec<Union>> {
        self.require_individual(individual).await?;
        Ok(self.storage.unions_of(individual).await?)
    }

    /// The union joining two individuals in either role, if any
    pub async fn union_between(&self, a: IndividualId, b: IndividualId) -> Result<Option<Union>> {
        validate_id("individual_id", a.get())?;
        validate_id("spouse_id", b.get())?;
        self.find_union_between(a, b).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Child Links
    // ─────────────────────────────────────────────────────────────────────────

    /// Link a child to a union.
    ///
    /// A child may belong to only one union unless re-parenting is allowed.
    pub async fn add_child(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
    ) -> Result<ChildLink> {
        validate_id("child_id", child.get())?;
        validate_label(relationship)?;
        let union = self.get_union(union_id).await?;
        self.require_individual(child).await?;

        if union.involves(child) {
            return Err(Error::InvalidRelation(format!(
                "individual {} is a party of union {} and cannot be its child",
                child, union_id
            )));
        }

        let existing = self.storage.child_links_of_individual(child).await?;
        if existing.iter().any(|l| l.union_id == union_id) {
            return Err(Error::AlreadyExists(format!(
                "individual {} is already a child of union {}",
                child, union_id
            )));
        }
        if let Some(other) = existing.first().filter(|_| !self.allow_reparenting) {
            return Err(Error::AlreadyExists(format!(
                "individual {} is already a child of union {}",
                child, other.union_id
            )));
        }

        let link = self
            .storage
            .create_child_link(union_id, child, relationship)
            .await?;
        tracing::info!("Linked child {} to union {}", child, union_id);
        Ok(link)
    }

    /// Remove a child link; `NotFound` if the child is not linked to the union
    pub async fn remove_child(&self, union_id: UnionId, child: IndividualId) -> Result<()> {
        validate_id("union_id", union_id.get())?;
        validate_id("child_id", child.get())?;
        if !self.storage.delete_child_link(union_id, child).await? {
            return Err(Error::not_found(
                RecordKind::ChildLink,
                format!("union {} / child {}", union_id, child),
            ));
        }
        tracing::info!("Unlinked child {} from union {}", child, union_id);
        Ok(())
    }

    /// Child links owned by a union
    pub async fn union_children(&self, union_id: UnionId) -> Result<Vec<ChildLink>> {
        self.get_union(union_id).await?;
        Ok(self.storage.child_links_of_union(union_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// `max(order of the husband's unions) + 1`, or 1 for a first union
    pub(crate) async fn next_marriage_order(&self, husband: IndividualId) -> Result<u32> {
        let unions = self.storage.unions_of(husband).await?;
        let max = unions
            .iter()
            .filter(|u| u.husband_id == Some(husband))
            .map(|u| u.marriage_order)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Store a validated union. Callers hold the husband's lock.
    async fn insert_union(&self, draft: &NewUnion) -> Result<Union> {
        let order = match draft.husband_id {
            Some(husband) => self.next_marriage_order(husband).await?,
            None => 1,
        };
        let union = self.storage.create_union(draft, order).await?;
        tracing::info!(
            "Created union {} (husband {:?}, wife {:?}, order {})",
            union.id,
            union.husband_id,
            union.wife_id,
            union.marriage_order
        );
        Ok(union)
    }

    async fn find_union_between(&self, a: IndividualId, b: IndividualId) -> Result<Option<Union>> {
        let unions = self.storage.unions_of(a).await?;
        Ok(unions.into_iter().find(|u| u.is_between(a, b)))
    }

    async fn require_individual(&self, id: IndividualId) -> Result<lineage_core::Individual> {
        validate_id("individual_id", id.get())?;
        self.storage
            .get_individual(id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Individual, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::{ErrorKind, Individual, NewIndividual};
    use lineage_storage::MemoryStorage;

    #[tokio::test]
    async fn test_husband_locks_forget_idle_entries() {
        let locks = Arc::new(HusbandLocks::default());
        let first = locks.acquire(IndividualId(1)).await.unwrap();
        let second = locks.acquire(IndividualId(2)).await.unwrap();
        assert_eq!(locks.tracked(), 2);

        drop(first);
        assert_eq!(locks.tracked(), 1);

        // A waiter keeps the entry alive until it is done too
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(IndividualId(2)).await.unwrap();
            })
        };
        tokio::task::yield_now().await;
        drop(second);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    async fn setup(allow_reparenting: bool) -> (Arc<MemoryStorage>, UnionManager) {
        let storage = Arc::new(MemoryStorage::new());
        let validator = ConsistencyValidator::new(storage.clone());
        let manager = UnionManager::new(storage.clone(), validator, allow_reparenting);
        (storage, manager)
    }

    async fn add(storage: &MemoryStorage, name: &str, gender: Gender) -> Individual {
        storage
            .create_individual(&NewIndividual::new(name, gender))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_marriage_order_is_sequential() {
        let (storage, manager) = setup(false).await;
        let h = add(&storage, "H", Gender::Male).await;
        let mut orders = Vec::new();
        for i in 0..4 {
            let w = add(&storage, &format!("W{}", i), Gender::Female).await;
            let union = manager
                .create_union(&NewUnion::between(h.id, w.id))
                .await
                .unwrap();
            orders.push(union.marriage_order);
        }
        assert_eq!(orders, vec![1, 2, 3, 4]);

        // Wife-only unions do not consume the husband's sequence
        let solo = add(&storage, "Solo", Gender::Female).await;
        let union = manager
            .create_union(&NewUnion::new(None, Some(solo.id)))
            .await
            .unwrap();
        assert_eq!(union.marriage_order, 1);
    }

    #[tokio::test]
    async fn test_concurrent_unions_get_distinct_orders() {
        let (storage, manager) = setup(false).await;
        let h = add(&storage, "H", Gender::Male).await;
        let mut wives = Vec::new();
        for i in 0..8 {
            wives.push(add(&storage, &format!("W{}", i), Gender::Female).await);
        }

        let tasks: Vec<_> = wives
            .iter()
            .map(|w| {
                let manager = manager.clone();
                let draft = NewUnion::between(h.id, w.id);
                tokio::spawn(async move { manager.create_union(&draft).await })
            })
            .collect();

        let mut orders = Vec::new();
        for task in tasks {
            orders.push(task.await.unwrap().unwrap().marriage_order);
        }
        orders.sort_unstable();
        assert_eq!(orders, (1..=8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_add_spouse_infers_roles() {
        let (storage, manager) = setup(false).await;
        let h = add(&storage, "H", Gender::Male).await;
        let w = add(&storage, "W", Gender::Female).await;
        let x = add(&storage, "X", Gender::Male).await;

        let union = manager.add_spouse(w.id, h.id).await.unwrap();
        assert_eq!(union.husband_id, Some(h.id));
        assert_eq!(union.wife_id, Some(w.id));

        let err = manager.add_spouse(h.id, w.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = manager.add_spouse(h.id, x.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);

        let found = manager.union_between(w.id, h.id).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(union.id));
    }

    #[tokio::test]
    async fn test_child_links() {
        let (storage, manager) = setup(false).await;
        let h = add(&storage, "H", Gender::Male).await;
        let w = add(&storage, "W", Gender::Female).await;
        let w2 = add(&storage, "W2", Gender::Female).await;
        let kid = add(&storage, "Kid", Gender::Female).await;

        let union = manager.add_spouse(h.id, w.id).await.unwrap();
        let second = manager.add_spouse(h.id, w2.id).await.unwrap();

        manager.add_child(union.id, kid.id, "daughter").await.unwrap();
        let err = manager.add_child(union.id, kid.id, "daughter").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = manager.add_child(second.id, kid.id, "stepdaughter").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = manager.add_child(union.id, h.id, "son").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);

        let err = manager.delete_union(union.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HasChildren);

        assert_eq!(manager.union_children(union.id).await.unwrap().len(), 1);
        manager.remove_child(union.id, kid.id).await.unwrap();
        let err = manager.remove_child(union.id, kid.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        manager.delete_union(union.id).await.unwrap();
        assert_eq!(
            manager.get_union(union.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_reparenting_when_allowed() {
        let (storage, manager) = setup(true).await;
        let h = add(&storage, "H", Gender::Male).await;
        let w = add(&storage, "W", Gender::Female).await;
        let w2 = add(&storage, "W2", Gender::Female).await;
        let kid = add(&storage, "Kid", Gender::Male).await;

        let first = manager.add_spouse(h.id, w.id).await.unwrap();
        let second = manager.add_spouse(h.id, w2.id).await.unwrap();
        manager.add_child(first.id, kid.id, "son").await.unwrap();
        manager.add_child(second.id, kid.id, "stepson").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_union_reorders_on_new_husband() {
        let (storage, manager) = setup(false).await;
        let h1 = add(&storage, "H1", Gender::Male).await;
        let h2 = add(&storage, "H2", Gender::Male).await;
        let w1 = add(&storage, "W1", Gender::Female).await;
        let w2 = add(&storage, "W2", Gender::Female).await;

        manager.add_spouse(h2.id, w2.id).await.unwrap();
        let union = manager.add_spouse(h1.id, w1.id).await.unwrap();
        assert_eq!(union.marriage_order, 1);

        let notes_only = UnionUpdate {
            notes: Some(Some("civil ceremony".into())),
            ..Default::default()
        };
        let updated = manager.update_union(union.id, &notes_only).await.unwrap();
        assert_eq!(updated.marriage_order, 1);

        let moved = UnionUpdate {
            husband_id: Some(Some(h2.id)),
            ..Default::default()
        };
        let updated = manager.update_union(union.id, &moved).await.unwrap();
        assert_eq!(updated.husband_id, Some(h2.id));
        assert_eq!(updated.marriage_order, 2);
        assert_eq!(updated.notes.as_deref(), Some("civil ceremony"));

        let bad = UnionUpdate {
            wife_id: Some(Some(h1.id)),
            ..Default::default()
        };
        let err = manager.update_union(union.id, &bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);
    }
}
