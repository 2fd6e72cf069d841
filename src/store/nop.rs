//! No-op store backend.
//!
//! Accepts every write, hands out fresh references, retains nothing. Used
//! for dry-run indexing.

use std::path::Path;

use crate::model::{
    FileRef, LocCtx, MemberEntry, NameKind, TypeEntry, TypeRef, TypeUseEntry, TypenameEntry,
};

use super::{Result, StoreError, TypenameCursor};

#[derive(Debug, Default)]
pub struct NopStore {
    file_id: i64,
    type_id: i64,
}

impl NopStore {
    pub fn add_file(&mut self, _path: &Path) -> Result<FileRef> {
        self.file_id += 1;
        Ok(FileRef(self.file_id))
    }

    pub fn typename_lookup(&self, _loc: &LocCtx, _name: &str, _kind: NameKind) -> Result<TypeRef> {
        Err(StoreError::NotFound)
    }

    pub fn type_insert(&mut self, _loc: &LocCtx, _entry: &TypeEntry) -> Result<TypeRef> {
        self.type_id += 1;
        Ok(TypeRef(self.type_id))
    }

    pub fn typename_insert(&mut self, _loc: &LocCtx, _entry: &TypenameEntry) -> Result<()> {
        Ok(())
    }

    pub fn member_insert(&mut self, _loc: &LocCtx, _entry: &MemberEntry) -> Result<()> {
        Ok(())
    }

    pub fn type_use_insert(&mut self, _loc: &LocCtx, _entry: &TypeUseEntry) -> Result<()> {
        Ok(())
    }

    pub fn file_lookup(&self, _file: FileRef) -> Result<String> {
        Err(StoreError::NotFound)
    }

    pub fn type_lookup(&self, _id: TypeRef) -> Result<(TypeEntry, LocCtx)> {
        Err(StoreError::NotFound)
    }

    pub fn member_lookup(&self, _parent: TypeRef, _name: &str) -> Result<(MemberEntry, LocCtx)> {
        Err(StoreError::NotFound)
    }

    pub fn typename_find<'a>(&'a self, _name: &'a str) -> Result<TypenameCursor<'a>> {
        Err(StoreError::InvalidArgument("no-op store has no cursor"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn hands_out_fresh_refs() {
        let mut db = NopStore::default();
        let a = db.add_file(&PathBuf::from("a.c")).unwrap();
        let b = db.add_file(&PathBuf::from("a.c")).unwrap();
        assert_ne!(a, b);

        let entry = TypeEntry {
            kind: crate::model::TypeKind::Struct,
            complete: true,
        };
        let t1 = db.type_insert(&LocCtx::default(), &entry).unwrap();
        let t2 = db.type_insert(&LocCtx::default(), &entry).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn reads_find_nothing() {
        let db = NopStore::default();
        assert!(matches!(
            db.type_lookup(TypeRef(1)),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.typename_lookup(&LocCtx::default(), "x", NameKind::Direct),
            Err(StoreError::NotFound)
        ));
    }
}
