//! Consistency checks run before every mutation of the family graph
//!
//! All checks are read-only; they query storage but never write to it.

use std::collections::HashSet;
use std::sync::Arc;

use lineage_core::limits::{validate_id, ValidationError};
use lineage_core::{
    CancelToken, Error, Gender, Individual, IndividualId, ParentRole, RecordKind, Result,
};
use lineage_storage::StorageBackend;

/// Validates parental and marital edges against the stored graph
#[derive(Clone)]
pub struct ConsistencyValidator {
    storage: Arc<dyn StorageBackend>,
}

impl ConsistencyValidator {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Check that `candidate` may become `child`'s parent in `role`.
    ///
    /// Returns the candidate record on success.
    pub async fn validate_parent(
        &self,
        child: IndividualId,
        candidate: IndividualId,
        role: ParentRole,
        cancel: &CancelToken,
    ) -> Result<Individual> {
        validate_id("child_id", child.get())?;
        if candidate == child {
            return Err(Error::InvalidRelation(format!(
                "individual {} cannot be their own {}",
                child, role
            )));
        }

        let parent = self.check_parent_candidate(candidate, role).await?;
        self.check_no_cycle(child, candidate, role, cancel).await?;
        Ok(parent)
    }

    /// Check that `candidate` exists and has the gender `role` requires
    pub async fn check_parent_candidate(
        &self,
        candidate: IndividualId,
        role: ParentRole,
    ) -> Result<Individual> {
        validate_id(role_field(role), candidate.get())?;
        let parent = self
            .storage
            .get_individual(candidate)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Individual, candidate))?;

        let required = role.required_gender();
        if parent.gender != required {
            return Err(Error::GenderMismatch(format!(
                "{} {} must be {}, is {}",
                role, parent.id, required, parent.gender
            )));
        }
        Ok(parent)
    }

    /// Father and mother, when both given, must be different people
    pub fn validate_distinct_parents(
        father: Option<IndividualId>,
        mother: Option<IndividualId>,
    ) -> Result<()> {
        match (father, mother) {
            (Some(f), Some(m)) if f == m => Err(Error::InvalidRelation(format!(
                "individual {} cannot be both father and mother",
                f
            ))),
            _ => Ok(()),
        }
    }

    /// Check the parties of a prospective union.
    ///
    /// At least one party is required, the two must differ, and each must
    /// exist with the gender of its role.
    pub async fn validate_union(
        &self,
        husband: Option<IndividualId>,
        wife: Option<IndividualId>,
    ) -> Result<(Option<Individual>, Option<Individual>)> {
        if husband.is_none() && wife.is_none() {
            return Err(ValidationError::MissingParty.into());
        }
        if let (Some(h), Some(w)) = (husband, wife) {
            if h == w {
                return Err(Error::InvalidRelation(format!(
                    "individual {} cannot be both husband and wife",
                    h
                )));
            }
        }

        let husband = match husband {
            Some(id) => Some(self.require_gender(id, "husband_id", Gender::Male).await?),
            None => None,
        };
        let wife = match wife {
            Some(id) => Some(self.require_gender(id, "wife_id", Gender::Female).await?),
            None => None,
        };
        Ok((husband, wife))
    }

    /// Walk upward from `candidate` and fail if the walk reaches `child` or
    /// revisits an individual.
    ///
    /// Dangling parent references end their branch of the walk.
    pub async fn check_no_cycle(
        &self,
        child: IndividualId,
        candidate: IndividualId,
        role: ParentRole,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut visited: HashSet<IndividualId> = HashSet::new();
        let mut stack = vec![candidate];

        while let Some(current) = stack.pop() {
            cancel.check("circular ancestry check")?;

            if current == child || !visited.insert(current) {
                tracing::debug!(
                    "Rejecting {} {} for {}: ancestry cycle at {}",
                    role,
                    candidate,
                    child,
                    current
                );
                return Err(Error::CircularRelation(format!(
                    "making {} the {} of {} would create an ancestry cycle",
                    candidate, role, child
                )));
            }

            if let Some(individual) = self.storage.get_individual(current).await? {
                // Mother pushed first so the father's line is walked first
                stack.extend(individual.mother_id);
                stack.extend(individual.father_id);
            }
        }

        Ok(())
    }

    async fn require_gender(
        &self,
        id: IndividualId,
        field: &'static str,
        gender: Gender,
    ) -> Result<Individual> {
        validate_id(field, id.get())?;
        let individual = self
            .storage
            .get_individual(id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Individual, id))?;
        if individual.gender != gender {
            return Err(Error::GenderMismatch(format!(
                "{} {} must be {}, is {}",
                field.trim_end_matches("_id"),
                id,
                gender,
                individual.gender
            )));
        }
        Ok(individual)
    }
}

fn role_field(role: ParentRole) -> &'static str {
    match role {
        ParentRole::Father => "father_id",
        ParentRole::Mother => "mother_id",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::{ErrorKind, NewIndividual};
    use lineage_storage::MemoryStorage;

    async fn setup() -> (Arc<MemoryStorage>, ConsistencyValidator) {
        let storage = Arc::new(MemoryStorage::new());
        let validator = ConsistencyValidator::new(storage.clone());
        (storage, validator)
    }

    async fn add(storage: &MemoryStorage, draft: NewIndividual) -> Individual {
        storage.create_individual(&draft).await.unwrap()
    }

    #[tokio::test]
    async fn test_gender_checks() {
        let (storage, validator) = setup().await;
        let man = add(&storage, NewIndividual::new("Jan", Gender::Male)).await;
        let woman = add(&storage, NewIndividual::new("Ewa", Gender::Female)).await;
        let child = add(&storage, NewIndividual::new("Kasia", Gender::Female)).await;
        let cancel = CancelToken::new();

        let err = validator
            .validate_parent(child.id, woman.id, ParentRole::Father, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);

        let err = validator
            .validate_parent(child.id, man.id, ParentRole::Mother, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);

        let father = validator
            .validate_parent(child.id, man.id, ParentRole::Father, &cancel)
            .await
            .unwrap();
        assert_eq!(father.id, man.id);
    }

    #[tokio::test]
    async fn test_self_and_same_parent() {
        let (storage, validator) = setup().await;
        let man = add(&storage, NewIndividual::new("Jan", Gender::Male)).await;

        let err = validator
            .validate_parent(man.id, man.id, ParentRole::Father, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);

        let err =
            ConsistencyValidator::validate_distinct_parents(Some(man.id), Some(man.id)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);
        assert!(ConsistencyValidator::validate_distinct_parents(Some(man.id), None).is_ok());
    }

    #[tokio::test]
    async fn test_missing_candidate_and_bad_ids() {
        let (_storage, validator) = setup().await;
        let err = validator
            .check_parent_candidate(IndividualId(77), ParentRole::Father)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = validator
            .check_parent_candidate(IndividualId(0), ParentRole::Mother)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_descendant_cannot_become_parent() {
        let (storage, validator) = setup().await;
        let grandpa = add(&storage, NewIndividual::new("Grandpa", Gender::Male)).await;
        let dad = add(
            &storage,
            NewIndividual::new("Dad", Gender::Male).with_father(grandpa.id),
        )
        .await;
        let son = add(&storage, NewIndividual::new("Son", Gender::Male).with_father(dad.id)).await;

        let err = validator
            .validate_parent(grandpa.id, son.id, ParentRole::Father, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularRelation);
    }

    #[tokio::test]
    async fn test_cycle_walk_terminates_on_corrupt_data() {
        let (storage, validator) = setup().await;
        let a = add(&storage, NewIndividual::new("A", Gender::Male)).await;
        let b = add(&storage, NewIndividual::new("B", Gender::Male).with_father(a.id)).await;
        let mut looped = a.clone();
        looped.father_id = Some(b.id);
        storage.put_individual(looped).unwrap();

        let stranger = add(&storage, NewIndividual::new("C", Gender::Male)).await;
        let err = validator
            .check_no_cycle(stranger.id, a.id, ParentRole::Father, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularRelation);
    }

    #[tokio::test]
    async fn test_union_parties() {
        let (storage, validator) = setup().await;
        let man = add(&storage, NewIndividual::new("Jan", Gender::Male)).await;
        let woman = add(&storage, NewIndividual::new("Ewa", Gender::Female)).await;

        let err = validator.validate_union(None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = validator
            .validate_union(Some(man.id), Some(man.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRelation);

        let err = validator
            .validate_union(Some(woman.id), Some(man.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenderMismatch);

        let (h, w) = validator.validate_union(Some(man.id), None).await.unwrap();
        assert_eq!(h.unwrap().id, man.id);
        assert!(w.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_walk() {
        let (storage, validator) = setup().await;
        let a = add(&storage, NewIndividual::new("A", Gender::Male)).await;
        let b = add(&storage, NewIndividual::new("B", Gender::Male)).await;
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = validator
            .check_no_cycle(b.id, a.id, ParentRole::Father, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
