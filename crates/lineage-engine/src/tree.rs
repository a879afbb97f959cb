//! Depth-bounded materialization of a nested family tree

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use lineage_core::limits::MAX_GENERATIONS;
use lineage_core::{
    CancelToken, Error, FamilyTree, Individual, IndividualId, RecordKind, Result, TreeNode,
};
use lineage_storage::StorageBackend;

use crate::relations::RelationshipQueries;

/// A loaded individual with its direct relations, before nesting
struct LoadedNode {
    individual: Individual,
    spouse: Option<Individual>,
    parents: Vec<Individual>,
    children: Vec<IndividualId>,
}

/// Builds [`FamilyTree`]s rooted at an individual.
///
/// Building runs in two phases. A breadth-first load visits each distinct
/// individual once, at the shallowest depth it is reachable from the root,
/// and checks for cancellation between loads. The nested tree is then
/// assembled from that per-call arena without touching storage, cutting any
/// edge that would revisit a node already on the current path.
#[derive(Clone)]
pub struct TreeMaterializer {
    storage: Arc<dyn StorageBackend>,
    queries: RelationshipQueries,
}

impl TreeMaterializer {
    pub fn new(storage: Arc<dyn StorageBackend>, queries: RelationshipQueries) -> Self {
        Self { storage, queries }
    }

    pub async fn build(
        &self,
        root: IndividualId,
        generations: u32,
        cancel: &CancelToken,
    ) -> Result<FamilyTree> {
        let generations = generations.clamp(1, MAX_GENERATIONS);
        let root_individual = self.queries.subject(root).await?;
        let arena = self.load(root_individual, generations, cancel).await?;

        let Some(loaded_root) = arena.get(&root) else {
            return Err(Error::not_found(RecordKind::Individual, root));
        };
        let mut on_path = HashSet::new();
        let node = assemble(&arena, loaded_root, generations, &mut on_path);
        tracing::debug!(
            "Built tree for {}: {} generation(s), {} node(s), {} distinct individual(s)",
            root,
            generations,
            node.size(),
            arena.len()
        );

        Ok(FamilyTree {
            generations,
            root: node,
        })
    }

    async fn load(
        &self,
        root: Individual,
        generations: u32,
        cancel: &CancelToken,
    ) -> Result<HashMap<IndividualId, LoadedNode>> {
        let mut arena: HashMap<IndividualId, LoadedNode> = HashMap::new();
        let mut queue: VecDeque<(Individual, u32)> = VecDeque::new();
        queue.push_back((root, generations));

        while let Some((individual, remaining)) = queue.pop_front() {
            if arena.contains_key(&individual.id) {
                continue;
            }
            cancel.check("tree materialization")?;

            if remaining == 0 {
                arena.insert(
                    individual.id,
                    LoadedNode {
                        individual,
                        spouse: None,
                        parents: Vec::new(),
                        children: Vec::new(),
                    },
                );
                continue;
            }

            let spouse = self
                .queries
                .spouses_of(individual.id)
                .await?
                .into_iter()
                .next()
                .map(|s| s.individual);
            let parents = self.queries.parents_of(&individual).await?.into_vec();
            let children = self.storage.children_of(individual.id).await?;

            let child_ids = children.iter().map(|c| c.id).collect();
            for child in children {
                if !arena.contains_key(&child.id) {
                    queue.push_back((child, remaining - 1));
                }
            }

            arena.insert(
                individual.id,
                LoadedNode {
                    individual,
                    spouse,
                    parents,
                    children: child_ids,
                },
            );
        }

        Ok(arena)
    }
}

/// Nest arena nodes below `loaded`, never past `remaining` levels and never
/// through an individual already on the path from the root
fn assemble(
    arena: &HashMap<IndividualId, LoadedNode>,
    loaded: &LoadedNode,
    remaining: u32,
    on_path: &mut HashSet<IndividualId>,
) -> TreeNode {
    if remaining == 0 {
        return TreeNode::leaf(loaded.individual.clone());
    }

    let id = loaded.individual.id;
    on_path.insert(id);
    let mut children = Vec::with_capacity(loaded.children.len());
    for child_id in &loaded.children {
        if on_path.contains(child_id) {
            tracing::debug!("Cutting ancestry cycle at {} below {}", child_id, id);
            continue;
        }
        if let Some(child) = arena.get(child_id) {
            children.push(assemble(arena, child, remaining - 1, on_path));
        }
    }
    on_path.remove(&id);

    TreeNode {
        individual: loaded.individual.clone(),
        spouse: loaded.spouse.clone(),
        parents: loaded.parents.clone(),
        children,
    }
}
