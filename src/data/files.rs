//! Content-addressed source file cache

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::database::{is_constraint_violation, Db, StorageError};
use super::models::CachedFile;

/// Signature of exactly one (path, body) pair.
pub fn file_signature(name: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Db {
    /// Store a source body and associate it with a run.
    ///
    /// Identical content is stored once; repeating the call is a no-op.
    pub fn cache_file_for_run(&self, run_id: &str, name: &str, body: &str) -> Result<String, StorageError> {
        let signature = file_signature(name, body);
        self.insert_tolerating_duplicate(
            "INSERT INTO file (signature, name, body) VALUES (?1, ?2, ?3)",
            params![signature, name, body],
        )?;
        self.insert_tolerating_duplicate(
            "INSERT INTO run_file (run_id, signature) VALUES (?1, ?2)",
            params![run_id, signature],
        )?;
        Ok(signature)
    }

    fn insert_tolerating_duplicate(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<(), StorageError> {
        match self.execute_buffered(sql, params) {
            Ok(_) => Ok(()),
            Err(StorageError::Sqlite(e)) if is_constraint_violation(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Body of `name` as cached for the run, or empty.
    pub fn get_cached_file(&self, run_id: &str, name: &str) -> Result<String, StorageError> {
        let body = self
            .reader()?
            .query_row(
                "SELECT body FROM file JOIN run_file USING (signature)
                 WHERE name = ?1 AND run_id = ?2
                 ORDER BY run_file.rowid DESC LIMIT 1",
                [name, run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body.unwrap_or_default())
    }

    /// `(name, body)` for a signature cached for the run, or two empty strings.
    pub fn get_cached_file_by_id(&self, run_id: &str, signature: &str) -> Result<(String, String), StorageError> {
        let found = self
            .reader()?
            .query_row(
                "SELECT name, body FROM file JOIN run_file USING (signature)
                 WHERE signature = ?1 AND run_id = ?2",
                [signature, run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(found.unwrap_or_default())
    }

    /// Signature of `name` as cached for the run, or empty.
    pub fn get_file_signature(&self, run_id: &str, name: &str) -> Result<String, StorageError> {
        let signature = self
            .reader()?
            .query_row(
                "SELECT signature FROM file JOIN run_file USING (signature)
                 WHERE name = ?1 AND run_id = ?2
                 ORDER BY run_file.rowid DESC LIMIT 1",
                [name, run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(signature.unwrap_or_default())
    }

    pub fn get_files_for_run(&self, run_id: &str) -> Result<Vec<CachedFile>, StorageError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT name, signature, run_id FROM file JOIN run_file USING (signature)
             WHERE run_id = ?1
             ORDER BY name ASC, run_file.rowid ASC",
        )?;
        let files = stmt
            .query_map([run_id], |row| {
                Ok(CachedFile {
                    name: row.get(0)?,
                    signature: row.get(1)?,
                    run_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RunStart;
    use chrono::Utc;

    fn db_with_runs(ids: &[&str]) -> Db {
        let db = Db::open_in_memory().unwrap();
        for id in ids {
            db.start_run(&RunStart {
                run_id: id.to_string(),
                cwd: "/".into(),
                description: vec![],
                start_time: Utc::now(),
            })
            .unwrap();
        }
        db
    }

    fn count(db: &Db, table: &str) -> i64 {
        db.reader()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_signature_covers_name_and_body() {
        let sig = file_signature("/a.py", "x = 1\n");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, file_signature("/a.py", "x = 1\n"));
        assert_ne!(sig, file_signature("/b.py", "x = 1\n"));
        assert_ne!(sig, file_signature("/a.py", "x = 2\n"));
        assert_ne!(file_signature("ab", "c"), file_signature("a", "bc"));
    }

    #[test]
    fn test_cache_is_idempotent() {
        let db = db_with_runs(&["r1"]);
        let first = db.cache_file_for_run("r1", "/a.py", "print(1)\n").unwrap();
        let second = db.cache_file_for_run("r1", "/a.py", "print(1)\n").unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&db, "file"), 1);
        assert_eq!(count(&db, "run_file"), 1);
    }

    #[test]
    fn test_changed_body_gets_new_signature() {
        let db = db_with_runs(&["r1"]);
        let old = db.cache_file_for_run("r1", "/a.py", "v1").unwrap();
        let new = db.cache_file_for_run("r1", "/a.py", "v2").unwrap();
        assert_ne!(old, new);
        assert_eq!(count(&db, "file"), 2);

        let files = db.get_files_for_run("r1").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.name == "/a.py" && f.run_id == "r1"));
        assert_eq!(db.get_cached_file_by_id("r1", &old).unwrap().1, "v1");
        assert_eq!(db.get_cached_file_by_id("r1", &new).unwrap().1, "v2");
        assert_eq!(db.get_cached_file("r1", "/a.py").unwrap(), "v2");
    }

    #[test]
    fn test_shared_content_across_runs() {
        let db = db_with_runs(&["r1", "r2"]);
        let a = db.cache_file_for_run("r1", "/lib.py", "shared").unwrap();
        let b = db.cache_file_for_run("r2", "/lib.py", "shared").unwrap();
        assert_eq!(a, b);
        assert_eq!(count(&db, "file"), 1);
        assert_eq!(count(&db, "run_file"), 2);
        assert_eq!(db.get_file_signature("r2", "/lib.py").unwrap(), a);
    }

    #[test]
    fn test_missing_lookups_are_blank() {
        let db = db_with_runs(&["r1"]);
        let sig = db.cache_file_for_run("r1", "/a.py", "body").unwrap();
        assert_eq!(db.get_cached_file("r1", "/nope.py").unwrap(), "");
        assert_eq!(db.get_cached_file("r2", "/a.py").unwrap(), "");
        assert_eq!(
            db.get_cached_file_by_id("r2", &sig).unwrap(),
            (String::new(), String::new())
        );
        assert_eq!(db.get_file_signature("r1", "/nope.py").unwrap(), "");
        assert!(db.get_files_for_run("r2").unwrap().is_empty());
    }

    #[test]
    fn test_delete_run_keeps_shared_files() {
        let db = db_with_runs(&["r1", "r2"]);
        let shared = db.cache_file_for_run("r1", "/lib.py", "shared").unwrap();
        db.cache_file_for_run("r2", "/lib.py", "shared").unwrap();
        db.cache_file_for_run("r1", "/only.py", "mine").unwrap();

        db.delete_run("r1").unwrap();

        assert_eq!(count(&db, "file"), 1);
        assert_eq!(db.get_cached_file_by_id("r2", &shared).unwrap().1, "shared");
        assert!(db.get_files_for_run("r1").unwrap().is_empty());
    }
}
