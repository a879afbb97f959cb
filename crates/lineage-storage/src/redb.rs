//! ReDB storage backend

use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use crate::traits::StorageBackend;
use async_trait::async_trait;
use lineage_core::{
    ChildLink, ChildLinkId, Individual, IndividualId, NewIndividual, NewUnion, RecordKind, Union,
    UnionId,
};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

type RecordTable = TableDefinition<'static, i64, &'static [u8]>;

// Table definitions
const INDIVIDUALS: RecordTable = TableDefinition::new("individuals");
const UNIONS: RecordTable = TableDefinition::new("unions");
const CHILD_LINKS: RecordTable = TableDefinition::new("child_links");
const COUNTERS: TableDefinition<&str, i64> = TableDefinition::new("counters");
const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// ReDB storage backend
///
/// Records are JSON values keyed by their integer id; the `counters` table
/// hands out ids inside the same write transaction as the insert.
pub struct RedbStorage {
    db: Mutex<Database>,
}

impl RedbStorage {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db: Mutex::new(db) };
        storage.migrate_to_latest()?;
        Ok(storage)
    }

    fn next_id(txn: &WriteTransaction, counter: &str) -> StorageResult<i64> {
        let mut table = txn.open_table(COUNTERS)?;
        let current = table.get(counter)?.map(|v| v.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(counter, next)?;
        Ok(next)
    }

    /// Overwrite an existing record; fails with `NotFound` if the id is free
    fn replace<T: Serialize>(
        &self,
        def: RecordTable,
        kind: RecordKind,
        id: i64,
        record: &T,
    ) -> StorageResult<()> {
        let value = serde_json::to_vec(record)?;

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(def)?;
            if table.get(id)?.is_none() {
                return Err(StorageError::not_found(kind, id));
            }
            table.insert(id, value.as_slice())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        id: i64,
    ) -> StorageResult<Option<T>> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(def)?;

        if let Some(value) = table.get(id)? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    fn remove(&self, def: RecordTable, kind: RecordKind, id: i64) -> StorageResult<()> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(def)?;
            let existed = table.remove(id)?.is_some();
            existed
        };
        write_txn.commit()?;

        if removed {
            Ok(())
        } else {
            Err(StorageError::not_found(kind, id))
        }
    }

    /// Decode every record of a table in id order, keeping the ones that pass `keep`
    fn scan<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        keep: impl Fn(&T) -> bool,
    ) -> StorageResult<Vec<T>> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(def)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: T = serde_json::from_slice(value.value())?;
            if keep(&record) {
                records.push(record);
            }
        }

        Ok(records)
    }
}

impl Migratable for RedbStorage {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = match read_txn.open_table(META) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let version = table.get(SCHEMA_VERSION_KEY)?.map(|v| v.value()).unwrap_or(0);
        Ok(version)
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(META)?;
            table.insert(SCHEMA_VERSION_KEY, version)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        if version != 1 {
            return Err(StorageError::Migration(format!(
                "no migration defined for version {}",
                version
            )));
        }

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(INDIVIDUALS)?;
            write_txn.open_table(UNIONS)?;
            write_txn.open_table(CHILD_LINKS)?;
            write_txn.open_table(COUNTERS)?;
            write_txn.open_table(META)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for RedbStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        db.begin_read()?;
        Ok(true)
    }

    // Individual operations

    async fn create_individual(&self, draft: &NewIndividual) -> StorageResult<Individual> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let individual = Individual::from_draft(
            IndividualId(Self::next_id(&write_txn, "individuals")?),
            draft,
        );
        {
            let value = serde_json::to_vec(&individual)?;
            let mut table = write_txn.open_table(INDIVIDUALS)?;
            table.insert(individual.id.get(), value.as_slice())?;
        }
        write_txn.commit()?;

        Ok(individual)
    }

    async fn get_individual(&self, id: IndividualId) -> StorageResult<Option<Individual>> {
        self.get(INDIVIDUALS, id.get())
    }

    async fn update_individual(&self, individual: &Individual) -> StorageResult<()> {
        self.replace(
            INDIVIDUALS,
            RecordKind::Individual,
            individual.id.get(),
            individual,
        )
    }

    async fn delete_individual(&self, id: IndividualId) -> StorageResult<()> {
        self.remove(INDIVIDUALS, RecordKind::Individual, id.get())
    }

    async fn children_of(&self, parent: IndividualId) -> StorageResult<Vec<Individual>> {
        self.scan(INDIVIDUALS, |i: &Individual| i.is_child_of(parent))
    }

    async fn search_individuals(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<(Vec<Individual>, usize)> {
        let matches = self.scan(INDIVIDUALS, |i: &Individual| i.matches_text(text))?;
        let total = matches.len();
        let page = matches.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    // Union operations

    async fn create_union(&self, draft: &NewUnion, marriage_order: u32) -> StorageResult<Union> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let union = Union::from_draft(
            UnionId(Self::next_id(&write_txn, "unions")?),
            draft,
            marriage_order,
        );
        {
            let value = serde_json::to_vec(&union)?;
            let mut table = write_txn.open_table(UNIONS)?;
            table.insert(union.id.get(), value.as_slice())?;
        }
        write_txn.commit()?;

        Ok(union)
    }

    async fn get_union(&self, id: UnionId) -> StorageResult<Option<Union>> {
        self.get(UNIONS, id.get())
    }

    async fn update_union(&self, union: &Union) -> StorageResult<()> {
        self.replace(UNIONS, RecordKind::Union, union.id.get(), union)
    }

    async fn delete_union(&self, id: UnionId) -> StorageResult<()> {
        self.remove(UNIONS, RecordKind::Union, id.get())
    }

    async fn unions_of(&self, individual: IndividualId) -> StorageResult<Vec<Union>> {
        self.scan(UNIONS, |u: &Union| u.involves(individual))
    }

    // Child link operations

    async fn create_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
    ) -> StorageResult<ChildLink> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let link = ChildLink::new(
            ChildLinkId(Self::next_id(&write_txn, "child_links")?),
            union_id,
            child,
            relationship,
        );
        {
            let value = serde_json::to_vec(&link)?;
            let mut table = write_txn.open_table(CHILD_LINKS)?;
            table.insert(link.id.get(), value.as_slice())?;
        }
        write_txn.commit()?;

        Ok(link)
    }

    async fn delete_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
    ) -> StorageResult<bool> {
        let doomed: Vec<i64> = self
            .scan(CHILD_LINKS, |l: &ChildLink| {
                l.union_id == union_id && l.individual_id == child
            })?
            .into_iter()
            .map(|l| l.id.get())
            .collect();
        if doomed.is_empty() {
            return Ok(false);
        }

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHILD_LINKS)?;
            for id in &doomed {
                table.remove(*id)?;
            }
        }
        write_txn.commit()?;
        tracing::debug!(
            "Removed {} child link(s) between union {} and individual {}",
            doomed.len(),
            union_id,
            child
        );

        Ok(true)
    }

    async fn child_links_of_union(&self, union_id: UnionId) -> StorageResult<Vec<ChildLink>> {
        self.scan(CHILD_LINKS, |l: &ChildLink| l.union_id == union_id)
    }

    async fn child_links_of_individual(
        &self,
        individual: IndividualId,
    ) -> StorageResult<Vec<ChildLink>> {
        self.scan(CHILD_LINKS, |l: &ChildLink| l.individual_id == individual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::CURRENT_VERSION;
    use lineage_core::Gender;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_redb_storage() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let storage = RedbStorage::open(&db_path).unwrap();
        storage.initialize().await.unwrap();
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_VERSION);

        let father = storage
            .create_individual(&NewIndividual::new("Tomasz", Gender::Male))
            .await
            .unwrap();
        let son = storage
            .create_individual(&NewIndividual::new("Adam", Gender::Male).with_father(father.id))
            .await
            .unwrap();
        assert_eq!(son.id, IndividualId(2));

        let retrieved = storage.get_individual(son.id).await.unwrap();
        assert_eq!(retrieved.unwrap().father_id, Some(father.id));
        assert_eq!(storage.children_of(father.id).await.unwrap().len(), 1);

        storage.delete_individual(son.id).await.unwrap();
        assert!(storage.get_individual(son.id).await.unwrap().is_none());

        let ghost = Individual::from_draft(IndividualId(42), &NewIndividual::new("x", Gender::Unknown));
        assert!(matches!(
            storage.update_individual(&ghost).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_redb_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.redb");

        {
            let storage = RedbStorage::open(&db_path).unwrap();
            let union = storage
                .create_union(&NewUnion::between(IndividualId(1), IndividualId(2)), 1)
                .await
                .unwrap();
            storage
                .create_child_link(union.id, IndividualId(3), "son")
                .await
                .unwrap();
        }

        let storage = RedbStorage::open(&db_path).unwrap();
        let second = storage
            .create_union(&NewUnion::between(IndividualId(1), IndividualId(4)), 2)
            .await
            .unwrap();
        assert_eq!(second.id, UnionId(2));
        assert_eq!(storage.unions_of(IndividualId(1)).await.unwrap().len(), 2);

        assert!(storage
            .delete_child_link(UnionId(1), IndividualId(3))
            .await
            .unwrap());
        assert!(storage.child_links_of_union(UnionId(1)).await.unwrap().is_empty());
    }
}
