//! Relationship queries over the stored family graph

use std::collections::HashSet;
use std::sync::Arc;

use lineage_core::limits::validate_id;
use lineage_core::{
    CancelToken, Error, Individual, IndividualId, Parents, RecordKind, Result, Spouse,
};
use lineage_storage::StorageBackend;

/// Resolves parents, siblings, spouses, ancestors and descendants
#[derive(Clone)]
pub struct RelationshipQueries {
    storage: Arc<dyn StorageBackend>,
}

impl RelationshipQueries {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub(crate) async fn subject(&self, id: IndividualId) -> Result<Individual> {
        validate_id("id", id.get())?;
        self.storage
            .get_individual(id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Individual, id))
    }

    /// Father and mother of an individual, each absent if unknown
    pub async fn parents(&self, id: IndividualId) -> Result<Parents> {
        let subject = self.subject(id).await?;
        self.parents_of(&subject).await
    }

    /// Resolve the parent references of an already-loaded individual.
    ///
    /// A reference to a missing record resolves to `None`.
    pub async fn parents_of(&self, individual: &Individual) -> Result<Parents> {
        let father = match individual.father_id {
            Some(id) => self.storage.get_individual(id).await?,
            None => None,
        };
        let mother = match individual.mother_id {
            Some(id) => self.storage.get_individual(id).await?,
            None => None,
        };
        Ok(Parents { father, mother })
    }

    /// Individuals whose father or mother is `id`
    pub async fn children(&self, id: IndividualId) -> Result<Vec<Individual>> {
        self.subject(id).await?;
        Ok(self.storage.children_of(id).await?)
    }

    /// Full and half siblings, excluding the subject
    pub async fn siblings(&self, id: IndividualId) -> Result<Vec<Individual>> {
        let subject = self.subject(id).await?;

        let mut seen = HashSet::from([subject.id]);
        let mut siblings = Vec::new();
        for parent in subject.parent_ids() {
            for child in self.storage.children_of(parent).await? {
                if seen.insert(child.id) {
                    siblings.push(child);
                }
            }
        }
        Ok(siblings)
    }

    /// Other party of each union the subject belongs to, earliest union first
    pub async fn spouses(&self, id: IndividualId) -> Result<Vec<Spouse>> {
        let subject = self.subject(id).await?;
        self.spouses_of(subject.id).await
    }

    pub(crate) async fn spouses_of(&self, id: IndividualId) -> Result<Vec<Spouse>> {
        let mut spouses = Vec::new();
        for union in self.storage.unions_of(id).await? {
            let Some(partner) = union.partner_of(id) else {
                continue;
            };
            if let Some(individual) = self.storage.get_individual(partner).await? {
                spouses.push(Spouse {
                    individual,
                    union_id: union.id,
                    marriage_order: union.marriage_order,
                });
            }
        }
        // Stable, so unions sharing an order keep id order
        spouses.sort_by_key(|s| s.marriage_order);
        Ok(spouses)
    }

    /// Ancestors up to `generations` levels, father's line before mother's.
    ///
    /// Each individual is expanded at most once, so corrupted cyclic data
    /// still terminates; an ancestor reached twice is reported once.
    pub async fn ancestors(
        &self,
        id: IndividualId,
        generations: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        let root = self.subject(id).await?;
        tracing::debug!("Walking {} generation(s) of ancestors of {}", generations, id);

        let mut expanded: HashSet<IndividualId> = HashSet::new();
        let mut reported: HashSet<IndividualId> = HashSet::from([root.id]);
        let mut found = Vec::new();
        let mut stack = vec![(root, generations)];

        while let Some((person, remaining)) = stack.pop() {
            cancel.check("ancestor walk")?;

            if reported.insert(person.id) {
                found.push(person.clone());
            }
            if remaining == 0 || !expanded.insert(person.id) {
                continue;
            }

            let Parents { father, mother } = self.parents_of(&person).await?;
            // Mother pushed first so the father's whole line is reported first
            if let Some(mother) = mother {
                stack.push((mother, remaining - 1));
            }
            if let Some(father) = father {
                stack.push((father, remaining - 1));
            }
        }

        Ok(found)
    }

    /// Descendants up to `generations` levels, depth first in child id order
    pub async fn descendants(
        &self,
        id: IndividualId,
        generations: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        let root = self.subject(id).await?;
        tracing::debug!(
            "Walking {} generation(s) of descendants of {}",
            generations,
            id
        );

        let mut expanded: HashSet<IndividualId> = HashSet::new();
        let mut reported: HashSet<IndividualId> = HashSet::from([root.id]);
        let mut found = Vec::new();
        let mut stack = vec![(root, generations)];

        while let Some((person, remaining)) = stack.pop() {
            cancel.check("descendant walk")?;

            if reported.insert(person.id) {
                found.push(person.clone());
            }
            if remaining == 0 || !expanded.insert(person.id) {
                continue;
            }

            let children = self.storage.children_of(person.id).await?;
            stack.extend(children.into_iter().rev().map(|c| (c, remaining - 1)));
        }

        Ok(found)
    }

    /// Ids of `id`'s ancestors within `generations`; trees rooted at any of
    /// them may embed `id`
    pub(crate) async fn ancestor_ids(
        &self,
        id: IndividualId,
        generations: u32,
    ) -> Result<Vec<IndividualId>> {
        let mut expanded: HashSet<IndividualId> = HashSet::new();
        let mut frontier = vec![(id, generations)];
        let mut ids = Vec::new();

        while let Some((current, remaining)) = frontier.pop() {
            if remaining == 0 || !expanded.insert(current) {
                continue;
            }
            if let Some(individual) = self.storage.get_individual(current).await? {
                for parent in individual.parent_ids() {
                    if parent != id && !ids.contains(&parent) {
                        ids.push(parent);
                    }
                    frontier.push((parent, remaining - 1));
                }
            }
        }

        Ok(ids)
    }

    /// Roots of every tree within `generations` that can embed `id`'s
    /// record: as a node (its ancestors), as a child node's parent (its
    /// descendants) or as a node's spouse (its partners and their ancestors)
    pub(crate) async fn tree_root_ids(
        &self,
        id: IndividualId,
        generations: u32,
    ) -> Result<Vec<IndividualId>> {
        let mut roots = self.ancestor_ids(id, generations).await?;
        let push = |roots: &mut Vec<IndividualId>, candidate: IndividualId| {
            if candidate != id && !roots.contains(&candidate) {
                roots.push(candidate);
            }
        };

        let mut expanded: HashSet<IndividualId> = HashSet::new();
        let mut frontier = vec![(id, generations)];
        let mut partners: Vec<IndividualId> = Vec::new();
        while let Some((current, remaining)) = frontier.pop() {
            if remaining == 0 || !expanded.insert(current) {
                continue;
            }
            for child in self.storage.children_of(current).await? {
                if current == id {
                    partners.extend(child.parent_ids().filter(|p| *p != id));
                }
                push(&mut roots, child.id);
                frontier.push((child.id, remaining - 1));
            }
        }

        for union in self.storage.unions_of(id).await? {
            partners.extend(union.partner_of(id));
        }
        partners.sort();
        partners.dedup();
        for partner in partners {
            push(&mut roots, partner);
            for ancestor in self.ancestor_ids(partner, generations).await? {
                push(&mut roots, ancestor);
            }
        }

        Ok(roots)
    }
}
