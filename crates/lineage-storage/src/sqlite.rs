//! SQLite storage backend

use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use crate::traits::StorageBackend;
use async_trait::async_trait;
use lineage_core::{
    ChildLink, ChildLinkId, Individual, IndividualId, NewIndividual, NewUnion, RecordKind, Union,
    UnionId,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;

/// SQLite storage backend
///
/// Each record is stored as JSON in a `data` column next to the indexed
/// columns the lookups filter on.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate_to_latest()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate_to_latest()?;
        Ok(storage)
    }

    fn query_records<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<T>> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn query_record<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Option<T>> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let data: Option<String> = conn
            .query_row(sql, params, |row| row.get(0))
            .optional()?;
        data.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(StorageError::from)
    }
}

impl Migratable for SqliteStorage {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        match version {
            1 => conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS individuals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    father_id INTEGER,
                    mother_id INTEGER,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS unions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    husband_id INTEGER,
                    wife_id INTEGER,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS child_links (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    union_id INTEGER NOT NULL,
                    individual_id INTEGER NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_individuals_father ON individuals(father_id);
                CREATE INDEX IF NOT EXISTS idx_individuals_mother ON individuals(mother_id);
                CREATE INDEX IF NOT EXISTS idx_unions_husband ON unions(husband_id);
                CREATE INDEX IF NOT EXISTS idx_unions_wife ON unions(wife_id);
                CREATE INDEX IF NOT EXISTS idx_child_links_union ON child_links(union_id);
                CREATE INDEX IF NOT EXISTS idx_child_links_individual ON child_links(individual_id);
                "#,
            )?,
            other => {
                return Err(StorageError::Migration(format!(
                    "no migration defined for version {}",
                    other
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(true)
    }

    // Individual operations

    async fn create_individual(&self, draft: &NewIndividual) -> StorageResult<Individual> {
        let mut conn = self.conn.lock().map_err(StorageError::lock)?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO individuals (father_id, mother_id, data) VALUES (?1, ?2, '{}')",
            params![draft.father_id.map(|i| i.get()), draft.mother_id.map(|i| i.get())],
        )?;
        let individual = Individual::from_draft(IndividualId(tx.last_insert_rowid()), draft);
        tx.execute(
            "UPDATE individuals SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&individual)?, individual.id.get()],
        )?;
        tx.commit()?;

        Ok(individual)
    }

    async fn get_individual(&self, id: IndividualId) -> StorageResult<Option<Individual>> {
        self.query_record("SELECT data FROM individuals WHERE id = ?1", params![id.get()])
    }

    async fn update_individual(&self, individual: &Individual) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let changed = conn.execute(
            "UPDATE individuals SET father_id = ?1, mother_id = ?2, data = ?3 WHERE id = ?4",
            params![
                individual.father_id.map(|i| i.get()),
                individual.mother_id.map(|i| i.get()),
                serde_json::to_string(individual)?,
                individual.id.get()
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found(
                RecordKind::Individual,
                individual.id.get(),
            ));
        }
        Ok(())
    }

    async fn delete_individual(&self, id: IndividualId) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let changed = conn.execute("DELETE FROM individuals WHERE id = ?1", params![id.get()])?;
        if changed == 0 {
            return Err(StorageError::not_found(RecordKind::Individual, id.get()));
        }
        Ok(())
    }

    async fn children_of(&self, parent: IndividualId) -> StorageResult<Vec<Individual>> {
        self.query_records(
            "SELECT data FROM individuals WHERE father_id = ?1 OR mother_id = ?1 ORDER BY id",
            params![parent.get()],
        )
    }

    async fn search_individuals(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<(Vec<Individual>, usize)> {
        // LOWER() in SQLite only folds ASCII, so matching happens on the
        // decoded records.
        let all: Vec<Individual> =
            self.query_records("SELECT data FROM individuals ORDER BY id", [])?;
        let matches: Vec<Individual> = all.into_iter().filter(|i| i.matches_text(text)).collect();
        let total = matches.len();
        let page = matches.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    // Union operations

    async fn create_union(&self, draft: &NewUnion, marriage_order: u32) -> StorageResult<Union> {
        let mut conn = self.conn.lock().map_err(StorageError::lock)?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO unions (husband_id, wife_id, data) VALUES (?1, ?2, '{}')",
            params![
                draft.husband_id.map(|i| i.get()),
                draft.wife_id.map(|i| i.get())
            ],
        )?;
        let union = Union::from_draft(UnionId(tx.last_insert_rowid()), draft, marriage_order);
        tx.execute(
            "UPDATE unions SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&union)?, union.id.get()],
        )?;
        tx.commit()?;

        Ok(union)
    }

    async fn get_union(&self, id: UnionId) -> StorageResult<Option<Union>> {
        self.query_record("SELECT data FROM unions WHERE id = ?1", params![id.get()])
    }

    async fn update_union(&self, union: &Union) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let changed = conn.execute(
            "UPDATE unions SET husband_id = ?1, wife_id = ?2, data = ?3 WHERE id = ?4",
            params![
                union.husband_id.map(|i| i.get()),
                union.wife_id.map(|i| i.get()),
                serde_json::to_string(union)?,
                union.id.get()
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found(RecordKind::Union, union.id.get()));
        }
        Ok(())
    }

    async fn delete_union(&self, id: UnionId) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let changed = conn.execute("DELETE FROM unions WHERE id = ?1", params![id.get()])?;
        if changed == 0 {
            return Err(StorageError::not_found(RecordKind::Union, id.get()));
        }
        Ok(())
    }

    async fn unions_of(&self, individual: IndividualId) -> StorageResult<Vec<Union>> {
        self.query_records(
            "SELECT data FROM unions WHERE husband_id = ?1 OR wife_id = ?1 ORDER BY id",
            params![individual.get()],
        )
    }

    // Child link operations

    async fn create_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
        relationship: &str,
    ) -> StorageResult<ChildLink> {
        let mut conn = self.conn.lock().map_err(StorageError::lock)?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO child_links (union_id, individual_id, data) VALUES (?1, ?2, '{}')",
            params![union_id.get(), child.get()],
        )?;
        let link = ChildLink::new(
            ChildLinkId(tx.last_insert_rowid()),
            union_id,
            child,
            relationship,
        );
        tx.execute(
            "UPDATE child_links SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&link)?, link.id.get()],
        )?;
        tx.commit()?;

        Ok(link)
    }

    async fn delete_child_link(
        &self,
        union_id: UnionId,
        child: IndividualId,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let changed = conn.execute(
            "DELETE FROM child_links WHERE union_id = ?1 AND individual_id = ?2",
            params![union_id.get(), child.get()],
        )?;
        Ok(changed > 0)
    }

    async fn child_links_of_union(&self, union_id: UnionId) -> StorageResult<Vec<ChildLink>> {
        self.query_records(
            "SELECT data FROM child_links WHERE union_id = ?1 ORDER BY id",
            params![union_id.get()],
        )
    }

    async fn child_links_of_individual(
        &self,
        individual: IndividualId,
    ) -> StorageResult<Vec<ChildLink>> {
        self.query_records(
            "SELECT data FROM child_links WHERE individual_id = ?1 ORDER BY id",
            params![individual.get()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::CURRENT_VERSION;
    use lineage_core::Gender;

    #[tokio::test]
    async fn test_sqlite_storage() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.initialize().await.unwrap();
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_VERSION);

        let mother = storage
            .create_individual(&NewIndividual::new("Anna", Gender::Female))
            .await
            .unwrap();
        let child = storage
            .create_individual(&NewIndividual::new("Zofia", Gender::Female).with_mother(mother.id))
            .await
            .unwrap();

        let retrieved = storage.get_individual(child.id).await.unwrap().unwrap();
        assert_eq!(retrieved.full_name, "Zofia");
        assert_eq!(retrieved.mother_id, Some(mother.id));

        let children = storage.children_of(mother.id).await.unwrap();
        assert_eq!(children.len(), 1);

        let mut orphan = retrieved.clone();
        orphan.mother_id = None;
        storage.update_individual(&orphan).await.unwrap();
        assert!(storage.children_of(mother.id).await.unwrap().is_empty());

        storage.delete_individual(child.id).await.unwrap();
        assert!(storage.get_individual(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_unions() {
        let storage = SqliteStorage::in_memory().unwrap();

        let union = storage
            .create_union(&NewUnion::between(IndividualId(1), IndividualId(2)), 2)
            .await
            .unwrap();
        assert_eq!(union.marriage_order, 2);

        let unions = storage.unions_of(IndividualId(1)).await.unwrap();
        assert_eq!(unions.len(), 1);
        assert_eq!(unions[0].wife_id, Some(IndividualId(2)));

        storage
            .create_child_link(union.id, IndividualId(3), "daughter")
            .await
            .unwrap();
        let links = storage.child_links_of_union(union.id).await.unwrap();
        assert_eq!(links[0].relationship, "daughter");

        assert!(storage.delete_child_link(union.id, IndividualId(3)).await.unwrap());
        assert!(storage.child_links_of_individual(IndividualId(3)).await.unwrap().is_empty());

        let missing = storage.delete_union(UnionId(99)).await;
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));
    }
}
