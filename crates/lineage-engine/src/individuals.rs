//! Individual lifecycle: create, update, delete, search and add-parent

use std::collections::HashSet;
use std::sync::Arc;

use lineage_core::limits::{clamp_page, validate_id, validate_name, validate_text};
use lineage_core::{
    AddParentOutcome, CancelToken, Error, Gender, Individual, IndividualId, IndividualUpdate,
    NewIndividual, Page, ParentRole, RecordKind, ReparentFailure, Result,
};
use lineage_storage::StorageBackend;

use crate::marriage::UnionManager;
use crate::validator::ConsistencyValidator;

/// Validated create/update/delete of individuals
#[derive(Clone)]
pub struct IndividualManager {
    storage: Arc<dyn StorageBackend>,
    validator: ConsistencyValidator,
    unions: UnionManager,
}

impl IndividualManager {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        validator: ConsistencyValidator,
        unions: UnionManager,
    ) -> Self {
        Self {
            storage,
            validator,
            unions,
        }
    }

    /// Create an individual.
    ///
    /// When both parents are given, their union is ensured first and the new
    /// individual is linked to it as a child.
    pub async fn create(&self, draft: &NewIndividual) -> Result<Individual> {
        validate_draft(draft)?;
        ConsistencyValidator::validate_distinct_parents(draft.father_id, draft.mother_id)?;
        if let Some(father) = draft.father_id {
            self.validator
                .check_parent_candidate(father, ParentRole::Father)
                .await?;
        }
        if let Some(mother) = draft.mother_id {
            self.validator
                .check_parent_candidate(mother, ParentRole::Mother)
                .await?;
        }

        let union = match (draft.father_id, draft.mother_id) {
            (Some(father), Some(mother)) => Some(self.unions.ensure_union(father, mother).await?),
            _ => None,
        };

        let individual = self.storage.create_individual(draft).await?;
        tracing::info!("Created individual {} ({})", individual.id, individual.full_name);

        if let Some(union) = union {
            let label = child_label(individual.gender);
            if let Err(e) = self.unions.add_child(union.id, individual.id, label).await {
                tracing::warn!(
                    "Could not link {} to union {}: {}",
                    individual.id,
                    union.id,
                    e
                );
            }
        }

        Ok(individual)
    }

    pub async fn get(&self, id: IndividualId) -> Result<Individual> {
        validate_id("id", id.get())?;
        self.storage
            .get_individual(id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Individual, id))
    }

    /// Apply a partial update after re-running the relation checks for any
    /// changed parent
    pub async fn update(
        &self,
        id: IndividualId,
        changes: &IndividualUpdate,
        cancel: &CancelToken,
    ) -> Result<Individual> {
        let current = self.get(id).await?;
        if let Some(name) = &changes.full_name {
            validate_name(name)?;
        }

        let mut updated = current.clone();
        updated.apply(changes);
        validate_record_text(&updated)?;
        ConsistencyValidator::validate_distinct_parents(updated.father_id, updated.mother_id)?;

        for role in [ParentRole::Father, ParentRole::Mother] {
            match updated.parent(role) {
                Some(parent) if current.parent(role) != Some(parent) => {
                    self.validator
                        .validate_parent(id, parent, role, cancel)
                        .await?;
                }
                _ => {}
            }
        }

        if updated.gender != current.gender {
            self.check_gender_change(&current, updated.gender).await?;
        }

        self.storage.update_individual(&updated).await?;
        tracing::info!("Updated individual {}", id);
        Ok(updated)
    }

    /// Delete an individual nobody depends on, along with its child links
    pub async fn delete(&self, id: IndividualId) -> Result<Individual> {
        let individual = self.get(id).await?;

        let children = self.storage.children_of(id).await?;
        if !children.is_empty() {
            return Err(Error::HasChildren(format!(
                "individual {} is the parent of {} individual(s)",
                id,
                children.len()
            )));
        }
        let unions = self.storage.unions_of(id).await?;
        if !unions.is_empty() {
            return Err(Error::InFamily(format!(
                "individual {} belongs to {} union(s)",
                id,
                unions.len()
            )));
        }

        for link in self.storage.child_links_of_individual(id).await? {
            self.storage.delete_child_link(link.union_id, id).await?;
        }
        self.storage.delete_individual(id).await?;
        tracing::info!("Deleted individual {} ({})", id, individual.full_name);
        Ok(individual)
    }

    /// Case-insensitive search over name and notes
    pub async fn search(&self, text: &str, limit: i64, offset: i64) -> Result<Page<Individual>> {
        let (limit, offset) = clamp_page(limit, offset);
        let (items, total) = self
            .storage
            .search_individuals(text.trim(), limit, offset)
            .await?;
        tracing::debug!("Search {:?}: {} of {} match(es)", text, items.len(), total);
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Create the missing parent of `child` and point the siblings sharing
    /// the other known parent at it.
    ///
    /// Only siblings whose `role` slot is empty are re-parented. A sibling
    /// that already records a parent in that role keeps it, so a half
    /// sibling is never silently reassigned.
    ///
    /// Sibling updates are best effort: failures are collected in the
    /// outcome and updates already applied are kept.
    pub async fn add_parent(
        &self,
        child: IndividualId,
        mut draft: NewIndividual,
        role: ParentRole,
        cancel: &CancelToken,
    ) -> Result<AddParentOutcome> {
        let subject = self.get(child).await?;
        if let Some(existing) = subject.parent(role) {
            return Err(Error::AlreadyExists(format!(
                "individual {} already has a {} ({})",
                child, role, existing
            )));
        }

        draft.gender = role.required_gender();
        draft.father_id = None;
        draft.mother_id = None;
        validate_draft(&draft)?;

        let parent = self.storage.create_individual(&draft).await?;
        tracing::info!(
            "Created {} {} ({}) for {}",
            role,
            parent.id,
            parent.full_name,
            child
        );

        let other = subject.parent(role.other());
        let siblings = match self.siblings_sharing(&subject, role).await {
            Ok(siblings) => siblings,
            Err(e) => {
                tracing::warn!("Could not list siblings of {}, updating it alone: {}", child, e);
                vec![subject.clone()]
            }
        };

        let mut reparented = Vec::new();
        let mut failures = Vec::new();
        for sibling in siblings {
            match self.reparent(&sibling, parent.id, role, cancel).await {
                Ok(()) => reparented.push(sibling.id),
                Err(e) => {
                    tracing::warn!(
                        "Could not set {} of {} ({}): {}",
                        role,
                        sibling.id,
                        sibling.full_name,
                        e
                    );
                    failures.push(ReparentFailure {
                        individual_id: sibling.id,
                        full_name: sibling.full_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        if !failures.is_empty() {
            tracing::warn!(
                "{} of {} sibling update(s) failed for new {} {}",
                failures.len(),
                failures.len() + reparented.len(),
                role,
                parent.id
            );
        }

        let (union, union_error) = match other {
            Some(other) => {
                let (father, mother) = match role {
                    ParentRole::Father => (parent.id, other),
                    ParentRole::Mother => (other, parent.id),
                };
                match self.unions.ensure_union(father, mother).await {
                    Ok(union) => (Some(union), None),
                    Err(e) => {
                        tracing::warn!("Could not ensure union of {} and {}: {}", father, mother, e);
                        (None, Some(e.to_string()))
                    }
                }
            }
            None => (None, None),
        };

        Ok(AddParentOutcome {
            parent,
            reparented,
            failures,
            union,
            union_error,
        })
    }

    /// The subject first, then every other child of the subject's known
    /// parent whose `role` slot is still empty
    async fn siblings_sharing(
        &self,
        subject: &Individual,
        role: ParentRole,
    ) -> Result<Vec<Individual>> {
        let mut seen = HashSet::from([subject.id]);
        let mut siblings = vec![subject.clone()];
        let Some(other) = subject.parent(role.other()) else {
            return Ok(siblings);
        };

        for child in self.storage.children_of(other).await? {
            let shares_gap =
                child.parent(role).is_none() && child.parent(role.other()) == Some(other);
            if shares_gap && seen.insert(child.id) {
                siblings.push(child);
            }
        }
        Ok(siblings)
    }

    async fn reparent(
        &self,
        sibling: &Individual,
        parent: IndividualId,
        role: ParentRole,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.validator
            .validate_parent(sibling.id, parent, role, cancel)
            .await?;
        let mut updated = sibling.clone();
        updated.set_parent(role, Some(parent));
        self.storage.update_individual(&updated).await?;
        Ok(())
    }

    async fn check_gender_change(&self, current: &Individual, gender: Gender) -> Result<()> {
        let children = self.storage.children_of(current.id).await?;
        if !children.is_empty() {
            return Err(Error::GenderMismatch(format!(
                "individual {} is recorded as a parent of {} individual(s) and cannot change gender to {}",
                current.id,
                children.len(),
                gender
            )));
        }
        let unions = self.storage.unions_of(current.id).await?;
        if !unions.is_empty() {
            return Err(Error::GenderMismatch(format!(
                "individual {} is a party of {} union(s) and cannot change gender to {}",
                current.id,
                unions.len(),
                gender
            )));
        }
        Ok(())
    }
}

fn child_label(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "son",
        Gender::Female => "daughter",
        _ => "child",
    }
}

fn validate_draft(draft: &NewIndividual) -> Result<()> {
    validate_name(&draft.full_name)?;
    validate_text("birth_place", draft.birth_place.as_deref())?;
    validate_text("death_place", draft.death_place.as_deref())?;
    validate_text("occupation", draft.occupation.as_deref())?;
    validate_text("notes", draft.notes.as_deref())?;
    validate_text("photo_url", draft.photo_url.as_deref())?;
    Ok(())
}

fn validate_record_text(individual: &Individual) -> Result<()> {
    validate_text("birth_place", individual.birth_place.as_deref())?;
    validate_text("death_place", individual.death_place.as_deref())?;
    validate_text("occupation", individual.occupation.as_deref())?;
    validate_text("notes", individual.notes.as_deref())?;
    validate_text("photo_url", individual.photo_url.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::ErrorKind;
    use lineage_storage::MemoryStorage;

    fn setup() -> (Arc<MemoryStorage>, IndividualManager) {
        let storage = Arc::new(MemoryStorage::new());
        let validator = ConsistencyValidator::new(storage.clone());
        let unions = UnionManager::new(storage.clone(), validator.clone(), false);
        let manager = IndividualManager::new(storage.clone(), validator, unions);
        (storage, manager)
    }

    #[tokio::test]
    async fn test_create_with_both_parents_links_union() {
        let (storage, manager) = setup();
        let dad = manager.create(&NewIndividual::new("Dad", Gender::Male)).await.unwrap();
        let mum = manager.create(&NewIndividual::new("Mum", Gender::Female)).await.unwrap();

        let kid = manager
            .create(
                &NewIndividual::new("Kid", Gender::Female)
                    .with_father(dad.id)
                    .with_mother(mum.id),
            )
            .await
            .unwrap();

        let unions = storage.unions_of(dad.id).await.unwrap();
        assert_eq!(unions.len(), 1);
        let links = storage.child_links_of_union(unions[0].id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].individual_id, kid.id);
        assert_eq!(links[0].relationship, "daughter");

        // A second child reuses the union
        manager
            .create(
                &NewIndividual::new("Kid2", Gender::Male)
                    .with_father(dad.id)
                    .with_mother(mum.id),
            )
            .await
            .unwrap();
        assert_eq!(storage.unions_of(dad.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_parents() {
        let (_storage, manager) = setup();
        let dad = manager.create(&NewIndividual::new("Dad", Gender::Male)).await.unwrap();

        let err = manager
            .create(&NewIndividual::new("", Gender::Male))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = manager
            .create(&NewIndividual::new("Kid", Gender::Male).with_mother(dad.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);

        let err = manager
            .create(
                &NewIndividual::new("Kid", Gender::Male)
                    .with_father(dad.id)
                    .with_mother(dad.id),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);

        let err = manager
            .create(&NewIndividual::new("Kid", Gender::Male).with_father(IndividualId(99)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_checks_cycles_and_gender() {
        let (_storage, manager) = setup();
        let cancel = CancelToken::new();
        let a = manager.create(&NewIndividual::new("A", Gender::Male)).await.unwrap();
        let d = manager
            .create(&NewIndividual::new("D", Gender::Male).with_father(a.id))
            .await
            .unwrap();

        let err = manager
            .update(
                a.id,
                &IndividualUpdate::default().with_parent(ParentRole::Father, d.id),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularRelation);

        let err = manager
            .update(
                a.id,
                &IndividualUpdate {
                    gender: Some(Gender::Female),
                    ..Default::default()
                },
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);

        let renamed = manager
            .update(
                d.id,
                &IndividualUpdate {
                    full_name: Some("Dawid".into()),
                    gender: Some(Gender::Other),
                    ..Default::default()
                },
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(renamed.full_name, "Dawid");
        assert_eq!(renamed.father_id, Some(a.id));
    }

    #[tokio::test]
    async fn test_delete_blockers() {
        let (_storage, manager) = setup();
        let dad = manager.create(&NewIndividual::new("Dad", Gender::Male)).await.unwrap();
        let mum = manager.create(&NewIndividual::new("Mum", Gender::Female)).await.unwrap();
        let kid = manager
            .create(
                &NewIndividual::new("Kid", Gender::Male)
                    .with_father(dad.id)
                    .with_mother(mum.id),
            )
            .await
            .unwrap();
        let loner = manager.create(&NewIndividual::new("Loner", Gender::Unknown)).await.unwrap();

        assert_eq!(manager.delete(dad.id).await.unwrap_err().kind(), ErrorKind::HasChildren);
        manager.delete(kid.id).await.unwrap();
        assert_eq!(manager.delete(dad.id).await.unwrap_err().kind(), ErrorKind::InFamily);
        manager.delete(loner.id).await.unwrap();
        assert_eq!(manager.get(loner.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_pages() {
        let (_storage, manager) = setup();
        for i in 0..12 {
            manager
                .create(&NewIndividual::new(format!("Kowalski {}", i), Gender::Male))
                .await
                .unwrap();
        }
        manager.create(&NewIndividual::new("Nowak", Gender::Female)).await.unwrap();

        let page = manager.search("kowal", 0, -5).await.unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.items.len(), 10);
        assert_eq!((page.limit, page.offset), (10, 0));

        let page = manager.search("kowal", 500, 10).await.unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_add_parent_reparents_siblings() {
        let (storage, manager) = setup();
        let cancel = CancelToken::new();
        let mum = manager.create(&NewIndividual::new("Mum", Gender::Female)).await.unwrap();
        let a = manager
            .create(&NewIndividual::new("A", Gender::Male).with_mother(mum.id))
            .await
            .unwrap();
        let b = manager
            .create(&NewIndividual::new("B", Gender::Female).with_mother(mum.id))
            .await
            .unwrap();
        let other_dad = manager.create(&NewIndividual::new("Other", Gender::Male)).await.unwrap();
        let half = manager
            .create(
                &NewIndividual::new("Half", Gender::Male)
                    .with_mother(mum.id)
                    .with_father(other_dad.id),
            )
            .await
            .unwrap();

        let outcome = manager
            .add_parent(a.id, NewIndividual::new("Dad", Gender::Unknown), ParentRole::Father, &cancel)
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.parent.gender, Gender::Male);
        assert_eq!(outcome.reparented, vec![a.id, b.id]);
        assert_eq!(
            storage.get_individual(b.id).await.unwrap().unwrap().father_id,
            Some(outcome.parent.id)
        );
        let union = outcome.union.unwrap();
        assert_eq!(union.husband_id, Some(outcome.parent.id));
        assert_eq!(union.wife_id, Some(mum.id));
        // a recorded father is kept
        assert_eq!(
            storage.get_individual(half.id).await.unwrap().unwrap().father_id,
            Some(other_dad.id)
        );

        let err = manager
            .add_parent(a.id, NewIndividual::new("Dad2", Gender::Male), ParentRole::Father, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_add_parent_without_other_parent() {
        let (_storage, manager) = setup();
        let orphan = manager.create(&NewIndividual::new("Orphan", Gender::Male)).await.unwrap();

        let outcome = manager
            .add_parent(
                orphan.id,
                NewIndividual::new("Mum", Gender::Male),
                ParentRole::Mother,
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.parent.gender, Gender::Female);
        assert_eq!(outcome.reparented, vec![orphan.id]);
        assert!(outcome.union.is_none());
        assert!(outcome.union_error.is_none());
    }
}
