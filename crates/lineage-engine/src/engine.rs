//! The engine facade and its builder

use std::future::Future;
use std::sync::Arc;

use lineage_core::limits::{clamp_generations, validate_id, MAX_GENERATIONS};
use lineage_core::{
    AddParentOutcome, CancelToken, ChildLink, FamilyTree, Individual, IndividualId,
    IndividualUpdate, NewIndividual, NewUnion, Page, ParentRole, Parents, Result, Spouse, Union,
    UnionId, UnionUpdate,
};
use lineage_storage::{CacheBackend, CacheKind, StorageBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheLayer;
use crate::config::EngineConfig;
use crate::individuals::IndividualManager;
use crate::marriage::UnionManager;
use crate::relations::RelationshipQueries;
use crate::tree::TreeMaterializer;
use crate::validator::ConsistencyValidator;

/// Wires a [`FamilyEngine`] from explicit collaborators
pub struct FamilyEngineBuilder {
    storage: Arc<dyn StorageBackend>,
    cache: Option<Arc<dyn CacheBackend>>,
    config: EngineConfig,
}

impl FamilyEngineBuilder {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            cache: None,
            config: EngineConfig::default(),
        }
    }

    /// Serve reads through `cache` and invalidate it on mutations
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine. With a cache this starts the cache writer task, so
    /// it must run inside a Tokio runtime.
    pub fn build(self) -> Result<FamilyEngine> {
        let storage = self.storage;
        let validator = ConsistencyValidator::new(storage.clone());
        let queries = RelationshipQueries::new(storage.clone());
        let unions = UnionManager::new(
            storage.clone(),
            validator.clone(),
            self.config.allow_reparenting,
        );
        let individuals = IndividualManager::new(storage.clone(), validator, unions.clone());
        let trees = TreeMaterializer::new(storage.clone(), queries.clone());

        let cache = match self.cache {
            Some(backend) => Some(Arc::new(CacheLayer::new(
                backend,
                self.config.cache_ttl(),
                self.config.cache_queue_capacity,
            )?)),
            None => None,
        };

        tracing::debug!(
            "Family engine ready (cache {}, reparenting {})",
            if cache.is_some() { "on" } else { "off" },
            self.config.allow_reparenting
        );

        Ok(FamilyEngine {
            storage,
            config: self.config,
            queries,
            unions,
            individuals,
            trees,
            cache,
        })
    }
}

/// Genealogical relationship engine.
///
/// Every operation takes a [`CancelToken`]; traversals check it between
/// steps. Mutations invalidate the affected cache entries before they
/// return.
#[derive(Clone)]
pub struct FamilyEngine {
    storage: Arc<dyn StorageBackend>,
    config: EngineConfig,
    queries: RelationshipQueries,
    unions: UnionManager,
    individuals: IndividualManager,
    trees: TreeMaterializer,
    cache: Option<Arc<CacheLayer>>,
}

impl FamilyEngine {
    pub fn builder(storage: Arc<dyn StorageBackend>) -> FamilyEngineBuilder {
        FamilyEngineBuilder::new(storage)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Wait for queued cache writes; a no-op without a cache
    pub async fn flush_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.flush().await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Individuals
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_individual(
        &self,
        draft: &NewIndividual,
        cancel: &CancelToken,
    ) -> Result<Individual> {
        cancel.check("create individual")?;
        let individual = self.individuals.create(draft).await?;
        self.invalidate(&[], &[individual.id], &[]).await;
        Ok(individual)
    }

    pub async fn get_individual(&self, id: IndividualId, cancel: &CancelToken) -> Result<Individual> {
        cancel.check("get individual")?;
        validate_id("id", id.get())?;
        self.read_through(CacheKind::Individual, id.get(), self.individuals.get(id))
            .await
    }

    pub async fn update_individual(
        &self,
        id: IndividualId,
        changes: &IndividualUpdate,
        cancel: &CancelToken,
    ) -> Result<Individual> {
        cancel.check("update individual")?;
        let before = self.tree_roots(id).await;
        let individual = self.individuals.update(id, changes, cancel).await?;
        self.invalidate(&[], &[id], &before).await;
        Ok(individual)
    }

    pub async fn delete_individual(
        &self,
        id: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Individual> {
        cancel.check("delete individual")?;
        let before = self.tree_roots(id).await;
        let individual = self.individuals.delete(id).await?;
        self.invalidate(&[], &[id], &before).await;
        Ok(individual)
    }

    pub async fn search_individuals(
        &self,
        text: &str,
        limit: i64,
        offset: i64,
        cancel: &CancelToken,
    ) -> Result<Page<Individual>> {
        cancel.check("search individuals")?;
        self.individuals.search(text, limit, offset).await
    }

    /// Create a missing parent and re-parent to it the child's siblings that
    /// have no parent in that role yet
    pub async fn add_parent(
        &self,
        child: IndividualId,
        draft: NewIndividual,
        role: ParentRole,
        cancel: &CancelToken,
    ) -> Result<AddParentOutcome> {
        cancel.check("add parent")?;
        let outcome = self.individuals.add_parent(child, draft, role, cancel).await?;

        let unions: Vec<UnionId> = outcome.union.iter().map(|u| u.id).collect();
        let mut people = outcome.reparented.clone();
        people.push(outcome.parent.id);
        self.invalidate(&unions, &people, &[]).await;
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_parents(&self, id: IndividualId, cancel: &CancelToken) -> Result<Parents> {
        cancel.check("get parents")?;
        self.queries.parents(id).await
    }

    pub async fn get_children(
        &self,
        id: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        cancel.check("get children")?;
        self.queries.children(id).await
    }

    pub async fn get_siblings(
        &self,
        id: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        cancel.check("get siblings")?;
        self.queries.siblings(id).await
    }

    pub async fn get_spouses(&self, id: IndividualId, cancel: &CancelToken) -> Result<Vec<Spouse>> {
        cancel.check("get spouses")?;
        self.queries.spouses(id).await
    }

    /// Ancestors within `generations` (≤ 0 uses the configured default,
    /// values above the cap are clamped)
    pub async fn get_ancestors(
        &self,
        id: IndividualId,
        generations: i32,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        let generations = clamp_generations(generations, self.config.default_generations);
        self.queries.ancestors(id, generations, cancel).await
    }

    /// Descendants within `generations`, clamped like [`Self::get_ancestors`]
    pub async fn get_descendants(
        &self,
        id: IndividualId,
        generations: i32,
        cancel: &CancelToken,
    ) -> Result<Vec<Individual>> {
        let generations = clamp_generations(generations, self.config.default_generations);
        self.queries.descendants(id, generations, cancel).await
    }

    /// Materialize the tree below `root`, served from the cache when one
    /// built for the same generation count is present
    pub async fn build_tree(
        &self,
        root: IndividualId,
        generations: i32,
        cancel: &CancelToken,
    ) -> Result<FamilyTree> {
        cancel.check("build tree")?;
        validate_id("id", root.get())?;
        let generations = clamp_generations(generations, self.config.default_tree_generations);

        let Some(cache) = &self.cache else {
            return self.trees.build(root, generations, cancel).await;
        };
        if let Some(tree) = cache.get_tree(root, generations).await {
            return Ok(tree);
        }
        let ticket = cache.ticket();
        let tree = self.trees.build(root, generations, cancel).await?;
        cache.put(CacheKind::Tree, root.get(), &tree, ticket);
        Ok(tree)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_union(&self, draft: &NewUnion, cancel: &CancelToken) -> Result<Union> {
        cancel.check("create union")?;
        let union = self.unions.create_union(draft).await?;
        self.invalidate_union(&union, None).await;
        Ok(union)
    }

    /// Join two individuals, taking husband and wife from their genders
    pub async fn add_spouse(
        &self,
        individual: IndividualId,
        spouse: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Union> {
        cancel.check("add spouse")?;
        let union = self.unions.add_spouse(individual, spouse).await?;
        self.invalidate_union(&union, None).await;
        Ok(union)
    }

    pub async fn get_union(&self, id: UnionId, cancel: &CancelToken) -> Result<Union> {
        cancel.check("get union")?;
        validate_id("union_id", id.get())?;
        self.read_through(CacheKind::Union, id.get(), self.unions.get_union(id))
            .await
    }

    pub async fn update_union(
        &self,
        id: UnionId,
        changes: &UnionUpdate,
        cancel: &CancelToken,
    ) -> Result<Union> {
        cancel.check("update union")?;
        let previous = self.unions.get_union(id).await?;
        let union = self.unions.update_union(id, changes).await?;
        self.invalidate_union(&union, Some(&previous)).await;
        Ok(union)
    }

    pub async fn delete_union(&self, id: UnionId, cancel: &CancelToken) -> Result<Union> {
        cancel.check("delete union")?;
        let union = self.unions.delete_union(id).await?;
        self.invalidate_union(&union, None).await;
        Ok(union)
    }

    pub async fn unions_of(
        &self,
        individual: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Vec<Union>> {
        cancel.check("list unions")?;
        self.unions.unions_of(individual).await
    }

    pub async fn union_between(
        &self,
        a: IndividualId,
        b: IndividualId,
        cancel: &CancelToken,
    ) -> Result<Option<Union>> {
        cancel.check("find union")?;
        self.unions.union_between(a, b).await
    }

    pub async fn add_child(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
        cancel: &CancelToken,
    ) -> Result<ChildLink> {
        cancel.check("add child")?;
        let link = self.unions.add_child(union_id, child, relationship).await?;
        self.invalidate_union_id(union_id).await;
        Ok(link)
    }

    pub async fn remove_child(
        &self,
        union_id: UnionId,
        child: IndividualId,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check("remove child")?;
        self.unions.remove_child(union_id, child).await?;
        self.invalidate_union_id(union_id).await;
        Ok(())
    }

    pub async fn union_children(
        &self,
        union_id: UnionId,
        cancel: &CancelToken,
    ) -> Result<Vec<ChildLink>> {
        cancel.check("list union children")?;
        self.unions.union_children(union_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache plumbing
    // ─────────────────────────────────────────────────────────────────────────

    async fn read_through<T, F>(&self, kind: CacheKind, id: i64, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T>>,
    {
        let Some(cache) = &self.cache else {
            return load.await;
        };
        if let Some(hit) = cache.get(kind, id).await {
            return Ok(hit);
        }
        let ticket = cache.ticket();
        let value = load.await?;
        cache.put(kind, id, &value, ticket);
        Ok(value)
    }

    /// Roots of cached trees that may embed `id` within the generation cap.
    /// Empty without a cache.
    async fn tree_roots(&self, id: IndividualId) -> Vec<IndividualId> {
        if self.cache.is_none() {
            return Vec::new();
        }
        match self.queries.tree_root_ids(id, MAX_GENERATIONS).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Could not resolve trees embedding {} for invalidation: {}", id, e);
                Vec::new()
            }
        }
    }

    /// Drop `union:U` for each union, `individual:X` and `tree:X` for each
    /// person plus every tree that can embed them, and the trees in `extra`
    async fn invalidate(&self, unions: &[UnionId], people: &[IndividualId], extra: &[IndividualId]) {
        let Some(cache) = &self.cache else {
            return;
        };

        let mut keys: Vec<(CacheKind, i64)> =
            unions.iter().map(|u| (CacheKind::Union, u.get())).collect();
        let mut push = |key: (CacheKind, i64)| {
            if !keys.contains(&key) {
                keys.push(key);
            }
        };
        for &person in people {
            push((CacheKind::Individual, person.get()));
            push((CacheKind::Tree, person.get()));
            for ancestor in self.tree_roots(person).await {
                push((CacheKind::Tree, ancestor.get()));
            }
        }
        for root in extra {
            push((CacheKind::Tree, root.get()));
        }

        cache.invalidate(&keys).await;
    }

    async fn invalidate_union(&self, union: &Union, previous: Option<&Union>) {
        let mut people: Vec<IndividualId> = union.party_ids().collect();
        if let Some(previous) = previous {
            people.extend(previous.party_ids().filter(|p| !union.involves(*p)));
        }
        self.invalidate(&[union.id], &people, &[]).await;
    }

    async fn invalidate_union_id(&self, union_id: UnionId) {
        if self.cache.is_none() {
            return;
        }
        match self.storage.get_union(union_id).await {
            Ok(Some(union)) => self.invalidate_union(&union, None).await,
            _ => self.invalidate(&[union_id], &[], &[]).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::{ErrorKind, Gender};
    use lineage_storage::{MemoryCache, MemoryStorage};

    fn engine_with_cache() -> (Arc<MemoryCache>, FamilyEngine) {
        let cache = Arc::new(MemoryCache::new(64));
        let engine = FamilyEngine::builder(Arc::new(MemoryStorage::new()))
            .with_cache(cache.clone())
            .build()
            .unwrap();
        (cache, engine)
    }

    #[tokio::test]
    async fn test_builder_without_cache() {
        let engine = FamilyEngineBuilder::new(Arc::new(MemoryStorage::new()))
            .with_config(EngineConfig {
                default_generations: 2,
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(engine.config().default_generations, 2);

        let cancel = CancelToken::new();
        let a = engine
            .create_individual(&NewIndividual::new("A", Gender::Male), &cancel)
            .await
            .unwrap();
        assert_eq!(engine.get_individual(a.id, &cancel).await.unwrap().id, a.id);
        engine.flush_cache().await;
    }

    #[tokio::test]
    async fn test_reads_populate_and_writes_invalidate() {
        let (cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        let a = engine
            .create_individual(&NewIndividual::new("A", Gender::Male), &cancel)
            .await
            .unwrap();

        engine.get_individual(a.id, &cancel).await.unwrap();
        engine.build_tree(a.id, 3, &cancel).await.unwrap();
        engine.flush_cache().await;
        assert_eq!(cache.len(), 2);

        let renamed = engine
            .update_individual(
                a.id,
                &IndividualUpdate {
                    full_name: Some("Adam".into()),
                    ..Default::default()
                },
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(renamed.full_name, "Adam");
        assert!(cache.is_empty());
        assert_eq!(engine.get_individual(a.id, &cancel).await.unwrap().full_name, "Adam");
    }

    #[tokio::test]
    async fn test_huge_ttl_still_caches() {
        let cache = Arc::new(MemoryCache::new(8));
        let engine = FamilyEngine::builder(Arc::new(MemoryStorage::new()))
            .with_cache(cache.clone())
            .with_config(EngineConfig {
                cache_ttl_secs: u64::MAX,
                ..Default::default()
            })
            .build()
            .unwrap();
        let cancel = CancelToken::new();
        let a = engine
            .create_individual(&NewIndividual::new("A", Gender::Male), &cancel)
            .await
            .unwrap();

        engine.get_individual(a.id, &cancel).await.unwrap();
        engine.flush_cache().await;
        assert_eq!(cache.len(), 1);

        engine.get_individual(a.id, &cancel).await.unwrap();
        engine.flush_cache().await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_new_child_invalidates_ancestor_trees() {
        let (_cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        let gf = engine
            .create_individual(&NewIndividual::new("Grandfather", Gender::Male), &cancel)
            .await
            .unwrap();
        let dad = engine
            .create_individual(&NewIndividual::new("Dad", Gender::Male).with_father(gf.id), &cancel)
            .await
            .unwrap();

        let tree = engine.build_tree(gf.id, 3, &cancel).await.unwrap();
        assert_eq!(tree.root.size(), 2);
        engine.flush_cache().await;

        engine
            .create_individual(&NewIndividual::new("Kid", Gender::Female).with_father(dad.id), &cancel)
            .await
            .unwrap();
        let tree = engine.build_tree(gf.id, 3, &cancel).await.unwrap();
        assert_eq!(tree.root.size(), 3);
    }

    #[tokio::test]
    async fn test_renamed_parent_refreshes_descendant_trees() {
        let (_cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        let dad = engine
            .create_individual(&NewIndividual::new("Dad", Gender::Male), &cancel)
            .await
            .unwrap();
        let mum = engine
            .create_individual(&NewIndividual::new("Mum", Gender::Female), &cancel)
            .await
            .unwrap();
        let kid = engine
            .create_individual(
                &NewIndividual::new("Kid", Gender::Female)
                    .with_father(dad.id)
                    .with_mother(mum.id),
                &cancel,
            )
            .await
            .unwrap();

        engine.build_tree(kid.id, 3, &cancel).await.unwrap();
        engine.build_tree(mum.id, 3, &cancel).await.unwrap();
        engine.flush_cache().await;

        engine
            .update_individual(
                dad.id,
                &IndividualUpdate {
                    full_name: Some("Renamed".into()),
                    ..Default::default()
                },
                &cancel,
            )
            .await
            .unwrap();

        let tree = engine.build_tree(kid.id, 3, &cancel).await.unwrap();
        let parents: Vec<&str> = tree.root.parents.iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(parents, vec!["Renamed", "Mum"]);

        // mum's tree shows dad as her spouse and as the kid's father
        let tree = engine.build_tree(mum.id, 3, &cancel).await.unwrap();
        assert_eq!(tree.root.spouse.as_ref().unwrap().full_name, "Renamed");
        assert_eq!(tree.root.children[0].parents[0].full_name, "Renamed");
    }

    #[tokio::test]
    async fn test_union_reads_are_cached() {
        let (cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        let h = engine
            .create_individual(&NewIndividual::new("H", Gender::Male), &cancel)
            .await
            .unwrap();
        let w = engine
            .create_individual(&NewIndividual::new("W", Gender::Female), &cancel)
            .await
            .unwrap();
        let union = engine.add_spouse(h.id, w.id, &cancel).await.unwrap();

        engine.get_union(union.id, &cancel).await.unwrap();
        engine.flush_cache().await;
        assert_eq!(cache.len(), 1);

        engine.delete_union(union.id, &cancel).await.unwrap();
        assert!(cache.is_empty());
        let err = engine.get_union(union.id, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_generation_defaults() {
        let (_cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        let root = engine
            .create_individual(&NewIndividual::new("Root", Gender::Male), &cancel)
            .await
            .unwrap();

        assert_eq!(engine.build_tree(root.id, 0, &cancel).await.unwrap().generations, 3);
        assert_eq!(engine.build_tree(root.id, 99, &cancel).await.unwrap().generations, 10);
        let err = engine.build_tree(IndividualId(0), 3, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let (_cache, engine) = engine_with_cache();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine
            .create_individual(&NewIndividual::new("A", Gender::Male), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
