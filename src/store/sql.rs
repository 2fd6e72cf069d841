//! Sqlite store backend.
//!
//! Normalizes input to and output from the database: paths are made
//! absolute before insertion, every value read back is sanity-checked before
//! it reaches a caller. Each operation compiles its statement on demand and
//! finalizes it before returning; no prepared statement survives a call.
//!
//! Every SQL string lives in a `const` in this file so the full set of
//! statements handed to the engine is auditable in one place.

use std::marker::PhantomData;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::model::{
    FileRef, FuncRef, LocCtx, MemberEntry, NameKind, TypeEntry, TypeKind, TypeRef, TypeUseEntry,
    TypenameEntry,
};

use super::{Result, StoreError, TypenameHit};

/// Table creation. Tables that already exist are left alone, which keeps a
/// database reopenable across versions without migration.
const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS file_table (\
id INTEGER PRIMARY KEY ASC,\
path TEXT\
);\
CREATE TABLE IF NOT EXISTS type_table (\
typeid INTEGER PRIMARY KEY ASC,\
kind INT,\
complete INT,\
file INT,\
func INT,\
scope INT,\
line INT,\
column INT\
);\
CREATE TABLE IF NOT EXISTS typename (\
name TEXT,\
kind INT,\
base_type INT,\
file INT,\
func INT,\
scope INT,\
line INT,\
column INT\
);\
CREATE TABLE IF NOT EXISTS incomplete_type (\
name TEXT,\
kind INT,\
base_type INT,\
file INT,\
line INT,\
column INT\
);\
CREATE TABLE IF NOT EXISTS type_use (\
base_type INT,\
kind INT,\
file INT,\
line INT,\
column INT\
);\
CREATE TABLE IF NOT EXISTS members (\
parent INT,\
base_type INT,\
name TEXT,\
file INT,\
line INT,\
column INT\
);";

const LOOKUP_FILE: &str = "SELECT id FROM file_table WHERE (path == ?1);";
const LOOKUP_FILE_ID: &str = "SELECT path FROM file_table WHERE (id == ?1);";
const INSERT_FILE: &str = "INSERT INTO file_table (path) VALUES (?1);";

const LOOKUP_TYPE: &str = "SELECT kind, complete, file, func, scope, line, column \
     FROM type_table WHERE (typeid == ?1);";
const INSERT_TYPE: &str = "INSERT INTO type_table (kind, complete, file, func, scope, line, column) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);";

// scope is written on insert but lookups are hard-coded global
const LOOKUP_TYPENAME: &str = "SELECT base_type, kind FROM typename \
     WHERE ((file == ?1) AND (name == ?2) AND (scope == 0));";
const FIND_TYPENAMES: &str = "SELECT name, kind, base_type, file, func, scope, line, column \
     FROM typename WHERE (name == ?1);";
const INSERT_TYPENAME: &str =
    "INSERT INTO typename (name, kind, base_type, file, func, scope, line, column) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);";

const LOOKUP_MEMBER: &str = "SELECT parent, base_type, name, file, line, column \
     FROM members WHERE ((parent == ?1) AND (name == ?2));";
const INSERT_MEMBER: &str = "INSERT INTO members (parent, base_type, name, file, line, column) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6);";

const INSERT_TYPE_USE: &str = "INSERT INTO type_use (base_type, kind, file, line, column) \
     VALUES (?1, ?2, ?3, ?4, ?5);";

#[derive(Debug)]
pub struct SqlStore {
    conn: Connection,
    readonly: bool,
}

impl SqlStore {
    /// Open the database at `db_path`.
    ///
    /// Read-write mode creates the file and any missing tables; read-only
    /// mode touches neither the schema nor the journal configuration.
    pub fn open(db_path: &Path, readonly: bool) -> Result<SqlStore> {
        info!(path = %db_path.display(), readonly, "opening sqlite store");

        let flags = if readonly {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_PRIVATE_CACHE
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_PRIVATE_CACHE
        };
        let conn = Connection::open_with_flags(db_path, flags)?;

        if !readonly {
            // journaled write-ahead log; the mode pragma answers with the
            // active mode, so it has to go through a query
            let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |r| r.get(0))?;
            debug!(mode, "configured journal mode");

            conn.execute_batch(SCHEMA)?;
        }

        Ok(SqlStore { conn, readonly })
    }

    pub fn close(self) -> Result<()> {
        debug!("flushing sqlite store");
        self.conn.close().map_err(|(_, e)| StoreError::Backend(e))
    }

    fn write_guard(&self) -> Result<()> {
        if self.readonly {
            return Err(StoreError::Readonly);
        }
        Ok(())
    }

    /// Insert a new entry for a source-containing file.
    ///
    /// The path is canonicalized to an absolute path first, so the many
    /// spellings that reach the same file collapse to one row. Reinserting
    /// is not an error; the preexisting id is returned.
    pub fn add_file(&mut self, path: &Path) -> Result<FileRef> {
        self.write_guard()?;

        // clean `path`; this also rejects paths that don't exist
        let clean = std::fs::canonicalize(path)?;
        let clean = clean.to_string_lossy().into_owned();
        debug!(path = %path.display(), clean = %clean, "add file");

        let preexisting: Option<i64> = self
            .conn
            .prepare(LOOKUP_FILE)?
            .query_row(params![clean], |row| row.get(0))
            .optional()?;
        if let Some(id) = preexisting {
            return Ok(FileRef(sanitize_rowid(id)?));
        }

        self.conn.prepare(INSERT_FILE)?.execute(params![clean])?;
        Ok(FileRef(self.conn.last_insert_rowid()))
    }

    pub fn typename_lookup(&self, loc: &LocCtx, name: &str, kind: NameKind) -> Result<TypeRef> {
        if name.is_empty() {
            return Err(StoreError::InvalidArgument("empty typename"));
        }

        let row: Option<(i64, i64)> = self
            .conn
            .prepare(LOOKUP_TYPENAME)?
            .query_row(params![loc.file.0, name], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((base_type, found_kind)) = row else {
            return Err(StoreError::NotFound);
        };

        let base_type = sanitize_rowid(base_type)?;
        let found_kind =
            NameKind::from_i64(found_kind).ok_or(StoreError::Corrupt("typename kind"))?;

        // the tag namespace is not shared with the typedef namespace:
        // `struct foo;` differs from `typedef struct {} foo;`
        if found_kind != kind {
            debug!(name, expected = %kind, found = %found_kind, "typename row has wrong kind");
            return Err(StoreError::NotFound);
        }

        Ok(TypeRef(base_type))
    }

    pub fn type_insert(&mut self, loc: &LocCtx, entry: &TypeEntry) -> Result<TypeRef> {
        self.write_guard()?;
        debug_assert!(entry.complete);

        self.conn.prepare(INSERT_TYPE)?.execute(params![
            entry.kind.as_i64(),
            entry.complete as i64,
            loc.file.0,
            loc.func.0,
            loc.scope,
            loc.line,
            loc.column,
        ])?;
        Ok(TypeRef(self.conn.last_insert_rowid()))
    }

    pub fn typename_insert(&mut self, loc: &LocCtx, entry: &TypenameEntry) -> Result<()> {
        self.write_guard()?;

        self.conn.prepare(INSERT_TYPENAME)?.execute(params![
            entry.name,
            entry.kind.as_i64(),
            entry.base_type.0,
            loc.file.0,
            loc.func.0,
            loc.scope,
            loc.line,
            loc.column,
        ])?;
        Ok(())
    }

    pub fn member_insert(&mut self, loc: &LocCtx, entry: &MemberEntry) -> Result<()> {
        self.write_guard()?;

        self.conn.prepare(INSERT_MEMBER)?.execute(params![
            entry.parent.0,
            entry.base_type.0,
            entry.name,
            loc.file.0,
            loc.line,
            loc.column,
        ])?;
        Ok(())
    }

    pub fn type_use_insert(&mut self, loc: &LocCtx, entry: &TypeUseEntry) -> Result<()> {
        self.write_guard()?;

        self.conn.prepare(INSERT_TYPE_USE)?.execute(params![
            entry.base_type.0,
            entry.kind.as_i64(),
            loc.file.0,
            loc.line,
            loc.column,
        ])?;
        Ok(())
    }

    pub fn file_lookup(&self, file: FileRef) -> Result<String> {
        sanitize_rowid(file.0)?;
        let path: Option<String> = self
            .conn
            .prepare(LOOKUP_FILE_ID)?
            .query_row(params![file.0], |row| row.get(0))
            .optional()?;
        match path {
            Some(path) if !path.is_empty() => Ok(path),
            Some(_) => Err(StoreError::Corrupt("empty file path")),
            None => Err(StoreError::NotFound),
        }
    }

    pub fn type_lookup(&self, id: TypeRef) -> Result<(TypeEntry, LocCtx)> {
        sanitize_rowid(id.0)?;
        type Raw = (i64, i64, i64, i64, i64, i64, i64);
        let row: Option<Raw> = self
            .conn
            .prepare(LOOKUP_TYPE)?
            .query_row(params![id.0], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })
            .optional()?;
        let Some((kind, complete, file, func, scope, line, column)) = row else {
            return Err(StoreError::NotFound);
        };

        let entry = TypeEntry {
            kind: TypeKind::from_i64(kind).ok_or(StoreError::Corrupt("type kind"))?,
            complete: complete != 0,
        };
        let loc = LocCtx {
            file: FileRef(sanitize_rowid(file)?),
            func: FuncRef(sanitize_ref(func)?),
            scope: sanitize_u32(scope)?,
            line: sanitize_u32(line)?,
            column: sanitize_u32(column)?,
        };
        Ok((entry, loc))
    }

    pub fn member_lookup(&self, parent: TypeRef, name: &str) -> Result<(MemberEntry, LocCtx)> {
        sanitize_rowid(parent.0)?;
        type Raw = (i64, i64, String, i64, i64, i64);
        let row: Option<Raw> = self
            .conn
            .prepare(LOOKUP_MEMBER)?
            .query_row(params![parent.0, name], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .optional()?;
        let Some((parent, base_type, name, file, line, column)) = row else {
            return Err(StoreError::NotFound);
        };

        if name.is_empty() {
            return Err(StoreError::Corrupt("empty member name"));
        }
        let entry = MemberEntry {
            parent: TypeRef(sanitize_rowid(parent)?),
            // absent for primitive-typed members
            base_type: TypeRef(sanitize_ref(base_type)?),
            name,
        };
        let loc = LocCtx {
            file: FileRef(sanitize_rowid(file)?),
            func: FuncRef::NONE,
            scope: 0,
            line: sanitize_u32(line)?,
            column: sanitize_u32(column)?,
        };
        Ok((entry, loc))
    }

    /// Search typename rows whose name equals `name`.
    ///
    /// The select statement is drained here, row by row, so the cursor never
    /// holds a live engine statement. Rows that fail sanitization are logged
    /// and skipped rather than ending the iteration.
    pub fn typename_find<'a>(&'a self, name: &'a str) -> Result<SqlTypenameCursor<'a>> {
        let mut stmt = self.conn.prepare(FIND_TYPENAMES)?;
        let mut raw = stmt.query(params![name])?;

        let mut rows = Vec::new();
        while let Some(row) = raw.next()? {
            type Raw = (String, i64, i64, i64, i64, i64, i64, i64);
            let decoded: rusqlite::Result<Raw> = (|| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })();
            let (name, kind, base_type, file, func, scope, line, column) = decoded?;

            match sanitize_typename_row(name, kind, base_type, file, func, scope, line, column) {
                Ok(sane) => rows.push(sane),
                Err(err) => {
                    warn!(%err, "skipping corrupt typename row");
                }
            }
        }

        Ok(SqlTypenameCursor {
            rows,
            pos: None,
            done: false,
            _store: PhantomData,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn sanitize_typename_row(
    name: String,
    kind: i64,
    base_type: i64,
    file: i64,
    func: i64,
    scope: i64,
    line: i64,
    column: i64,
) -> Result<(TypenameEntry, LocCtx)> {
    if name.is_empty() {
        return Err(StoreError::Corrupt("empty typename"));
    }
    let entry = TypenameEntry {
        kind: NameKind::from_i64(kind).ok_or(StoreError::Corrupt("typename kind"))?,
        base_type: TypeRef(sanitize_rowid(base_type)?),
        name,
    };
    let loc = LocCtx {
        file: FileRef(sanitize_rowid(file)?),
        func: FuncRef(sanitize_ref(func)?),
        scope: sanitize_u32(scope)?,
        line: sanitize_u32(line)?,
        column: sanitize_u32(column)?,
    };
    Ok((entry, loc))
}

/// A row reference must be strictly positive.
fn sanitize_rowid(rowid: i64) -> Result<i64> {
    if rowid <= 0 {
        return Err(StoreError::Corrupt("non-positive rowid"));
    }
    Ok(rowid)
}

/// Like [`sanitize_rowid`] but 0 is allowed as the absent value.
fn sanitize_ref(rowid: i64) -> Result<i64> {
    if rowid < 0 {
        return Err(StoreError::Corrupt("negative reference"));
    }
    Ok(rowid)
}

fn sanitize_u32(v: i64) -> Result<u32> {
    u32::try_from(v).map_err(|_| StoreError::Corrupt("integer out of range"))
}

/// Cursor over the result set of a typename search.
///
/// `peek` borrows the name from the cursor's row storage; the phantom store
/// borrow keeps the cursor from outliving the store or overlapping a write.
#[derive(Debug)]
pub struct SqlTypenameCursor<'a> {
    rows: Vec<(TypenameEntry, LocCtx)>,
    pos: Option<usize>,
    done: bool,
    _store: PhantomData<&'a SqlStore>,
}

impl SqlTypenameCursor<'_> {
    pub fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        let next = match self.pos {
            Some(i) => i + 1,
            None => 0,
        };
        if next >= self.rows.len() {
            self.done = true;
            return false;
        }
        self.pos = Some(next);
        true
    }

    pub fn peek(&self) -> Option<TypenameHit<'_>> {
        if self.done {
            return None;
        }
        let (entry, loc) = &self.rows[self.pos?];
        Some(TypenameHit {
            kind: entry.kind,
            base_type: entry.base_type,
            name: &entry.name,
            loc: *loc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db() -> (tempfile::TempDir, SqlStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = SqlStore::open(&dir.path().join("cf.db"), false).unwrap();
        (dir, db)
    }

    fn loc(file: FileRef, line: u32) -> LocCtx {
        LocCtx {
            file,
            line,
            column: 1,
            ..LocCtx::default()
        }
    }

    fn insert_named(db: &mut SqlStore, file: FileRef, name: &str, line: u32) -> TypeRef {
        let id = db
            .type_insert(
                &loc(file, line),
                &TypeEntry {
                    kind: TypeKind::Struct,
                    complete: true,
                },
            )
            .unwrap();
        db.typename_insert(
            &loc(file, line),
            &TypenameEntry {
                kind: NameKind::Direct,
                base_type: id,
                name: name.to_string(),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn add_file_collapses_path_spellings() {
        let (dir, mut db) = scratch_db();
        let target = dir.path().join("t16.h");
        std::fs::write(&target, "struct s { int a; };\n").unwrap();

        let a = db.add_file(&target).unwrap();
        let dotted = dir.path().join(".").join("t16.h");
        let b = db.add_file(&dotted).unwrap();
        assert_eq!(a, b);

        let stored = db.file_lookup(a).unwrap();
        assert!(stored.ends_with("t16.h"));
        assert!(Path::new(&stored).is_absolute());
    }

    #[test]
    fn add_file_rejects_missing_paths() {
        let (dir, mut db) = scratch_db();
        let err = db.add_file(&dir.path().join("no-such.c")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn type_roundtrip() {
        let (_dir, mut db) = scratch_db();
        let file = FileRef(1);
        let id = db
            .type_insert(
                &loc(file, 7),
                &TypeEntry {
                    kind: TypeKind::Union,
                    complete: true,
                },
            )
            .unwrap();
        assert_eq!(id, TypeRef(1));

        let (entry, found) = db.type_lookup(id).unwrap();
        assert_eq!(entry.kind, TypeKind::Union);
        assert!(entry.complete);
        assert_eq!(found.line, 7);
        assert!(matches!(db.type_lookup(TypeRef(2)), Err(StoreError::NotFound)));
    }

    #[test]
    fn typename_lookup_checks_kind() {
        let (_dir, mut db) = scratch_db();
        let file = FileRef(1);
        let id = insert_named(&mut db, file, "foo", 3);

        assert_eq!(
            db.typename_lookup(&loc(file, 9), "foo", NameKind::Direct).unwrap(),
            id
        );
        assert!(matches!(
            db.typename_lookup(&loc(file, 9), "foo", NameKind::Typedef),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.typename_lookup(&loc(FileRef(2), 9), "foo", NameKind::Direct),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn member_roundtrip() {
        let (_dir, mut db) = scratch_db();
        let file = FileRef(1);
        let parent = insert_named(&mut db, file, "foo", 1);
        db.member_insert(
            &loc(file, 2),
            &MemberEntry {
                parent,
                base_type: TypeRef::NONE,
                name: "a".to_string(),
            },
        )
        .unwrap();

        let (entry, found) = db.member_lookup(parent, "a").unwrap();
        assert_eq!(entry.parent, parent);
        assert!(entry.base_type.is_none());
        assert_eq!(found.line, 2);
        assert!(matches!(
            db.member_lookup(parent, "b"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn find_cursor_reports_all_matches() {
        let (_dir, mut db) = scratch_db();
        let file = FileRef(1);
        let a = insert_named(&mut db, file, "foo", 1);
        insert_named(&mut db, file, "bar", 2);
        let b = insert_named(&mut db, file, "foo", 3);

        let mut cursor = db.typename_find("foo").unwrap();
        let mut refs = Vec::new();
        while cursor.next() {
            refs.push(cursor.peek().unwrap().base_type);
        }
        assert_eq!(refs, vec![a, b]);
        assert!(!cursor.next());
        assert!(cursor.peek().is_none());
    }

    #[test]
    fn find_cursor_skips_corrupt_rows() {
        let (_dir, mut db) = scratch_db();
        let file = FileRef(1);
        insert_named(&mut db, file, "foo", 1);
        // a row with a kind outside the enum and a row with rowid 0
        db.conn
            .execute(
                "INSERT INTO typename (name, kind, base_type, file, func, scope, line, column) \
                 VALUES ('foo', 77, 1, 1, 0, 0, 9, 9);",
                [],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO typename (name, kind, base_type, file, func, scope, line, column) \
                 VALUES ('foo', 1, 0, 1, 0, 0, 9, 9);",
                [],
            )
            .unwrap();

        let mut cursor = db.typename_find("foo").unwrap();
        let mut n = 0;
        while cursor.next() {
            n += 1;
        }
        assert_eq!(n, 1);
    }

    #[test]
    fn readonly_rejects_writes_before_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.db");
        {
            let mut db = SqlStore::open(&path, false).unwrap();
            insert_named(&mut db, FileRef(1), "foo", 1);
            db.close().unwrap();
        }

        let mut db = SqlStore::open(&path, true).unwrap();
        assert!(matches!(
            db.type_insert(
                &loc(FileRef(1), 1),
                &TypeEntry {
                    kind: TypeKind::Struct,
                    complete: true
                }
            ),
            Err(StoreError::Readonly)
        ));
        assert!(matches!(
            db.add_file(Path::new("/tmp")),
            Err(StoreError::Readonly)
        ));
        // reads still work
        assert_eq!(
            db.typename_lookup(&loc(FileRef(1), 1), "foo", NameKind::Direct)
                .unwrap(),
            TypeRef(1)
        );
    }

    #[test]
    fn reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cf.db");
        let id = {
            let mut db = SqlStore::open(&path, false).unwrap();
            let id = insert_named(&mut db, FileRef(1), "foo", 4);
            db.close().unwrap();
            id
        };

        let db = SqlStore::open(&path, false).unwrap();
        let (entry, found) = db.type_lookup(id).unwrap();
        assert_eq!(entry.kind, TypeKind::Struct);
        assert_eq!(found.line, 4);
    }
}
