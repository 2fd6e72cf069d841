//! Record scoreboard — staged entries for one top-level composite type.
//!
//! Record types cannot simply be inserted as they are visited. Consider
//! (valid C89, at global scope):
//!
//! ```c
//! struct {
//!     struct global { int a; };
//!     int garbage;
//! };
//! ```
//!
//! `struct global` must be indexed; the outer unnamed struct must be
//! discarded, and whether it can acquire a name (from a following typedef or
//! instance declarator) is only known after its subtree — and possibly the
//! next sibling — has been consumed. Inserting eagerly would mean deleting
//! rows after the fact, and a database transaction doesn't help because rows
//! to keep and rows to discard interleave. So everything derived from one
//! top-level record declaration is staged here and committed as a unit once
//! the naming situation is resolved.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::model::{
    LocCtx, MemberEntry, NameKind, TypeEntry, TypeRef, TypeUseEntry, TypeUseKind, TypenameEntry,
};
use crate::store::{Store, StoreError};

/// Front-end canonical type identity, unique within one translation unit.
///
/// Wraps the USR of the canonical type's declaration. Only ever used
/// in-memory during ingestion; translated to a persistent [`TypeRef`] at
/// commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonId(pub String);

/// All staged entries for one record: the type itself, its optional name,
/// and the source locations of both.
#[derive(Debug)]
struct StagedType {
    canon: CanonId,
    entry: TypeEntry,
    name: Option<(NameKind, String)>,
    /// Location of the type declaration.
    loc: LocCtx,
    /// Location of the name, when one exists. Direct names share the
    /// declaration location; declarator names get their own.
    name_loc: LocCtx,
}

#[derive(Debug)]
struct StagedMember {
    /// Enclosing record, by canonical identity.
    parent: CanonId,
    /// Canonical identity of the member's type; `None` for primitives.
    base: Option<CanonId>,
    name: String,
    loc: LocCtx,
}

/// A type use staged together with the record it appears in. `within` keeps
/// a reparsed header from re-emitting uses: at commit, uses only survive
/// when their enclosing record was newly inserted.
#[derive(Debug)]
struct StagedUse {
    within: CanonId,
    base: CanonId,
    loc: LocCtx,
}

/// How the name of a record declaration was resolved at visit time.
#[derive(Debug)]
pub enum RecordName {
    /// Tag given with the definition: `struct foo { ... }`.
    Direct(String),
    /// No tag; a following typedef or instance declarator may still name it.
    Unnamed,
}

#[derive(Debug, Default)]
pub struct Scoreboard {
    /// Insertion-ordered staged records. Index 0 is the top-level record;
    /// later entries are nested records found during recursion.
    new_types: Vec<StagedType>,
    members: Vec<StagedMember>,
    type_uses: Vec<StagedUse>,
    /// Canonical id -> index into `new_types`, for exactly the entries whose
    /// name is still unresolved.
    unnamed: HashMap<CanonId, usize>,
    /// Enclosing records that can own members. Truly-anonymous nested
    /// records are never pushed, so their members attribute to the top of
    /// this stack.
    parents: Vec<CanonId>,
}

impl Scoreboard {
    pub fn is_empty(&self) -> bool {
        self.new_types.is_empty()
    }

    /// Make the scoreboard look new without releasing vector capacity.
    pub fn reset(&mut self) {
        self.new_types.clear();
        self.members.clear();
        self.type_uses.clear();
        self.unnamed.clear();
        self.parents.clear();
    }

    /// Stage a record declaration. Call once for the top-level record and
    /// once per nested named/unnamed record, in visit order. Truly-anonymous
    /// records are not staged at all; only their members are (attributed to
    /// the nearest named ancestor).
    pub fn stage_record(&mut self, canon: CanonId, entry: TypeEntry, name: RecordName, loc: LocCtx) {
        let staged = match name {
            RecordName::Direct(name) => StagedType {
                canon: canon.clone(),
                entry,
                name: Some((NameKind::Direct, name)),
                loc,
                // direct names reuse the record location
                name_loc: loc,
            },
            RecordName::Unnamed => StagedType {
                canon: canon.clone(),
                entry,
                name: None,
                loc,
                name_loc: loc,
            },
        };
        let index = self.new_types.len();
        if staged.name.is_none() {
            self.unnamed.insert(canon, index);
        }
        self.new_types.push(staged);
    }

    /// True if the top-level record is still waiting for a declarator name.
    pub fn primary_is_unnamed(&self) -> bool {
        match self.new_types.first() {
            Some(staged) => self.unnamed.contains_key(&staged.canon),
            None => false,
        }
    }

    pub fn primary_canon(&self) -> Option<&CanonId> {
        self.new_types.first().map(|staged| &staged.canon)
    }

    /// Attach a typedef or instance-declarator name to the top-level record.
    ///
    /// Panics if the record already has a name; the driver only calls this
    /// after checking the awaiting state.
    pub fn attach_primary_name(&mut self, kind: NameKind, name: String, loc: LocCtx) {
        let staged = self
            .new_types
            .first_mut()
            .expect("no staged record to name");
        assert!(
            matches!(kind, NameKind::Typedef | NameKind::Var),
            "primary declarator name must be a typedef or var name"
        );
        let index = self
            .unnamed
            .remove(&staged.canon)
            .expect("tried to name an already-named record");
        assert_eq!(index, 0);

        staged.name = Some((kind, name));
        staged.name_loc = loc;
    }

    /// Stage a member of the record at the top of the parent stack.
    pub fn stage_member(&mut self, name: String, base: Option<CanonId>, loc: LocCtx) {
        let parent = self
            .parents
            .last()
            .expect("member staged with no enclosing record")
            .clone();
        debug!(member = %name, parent = %parent.0, "stage member");
        self.members.push(StagedMember {
            parent,
            base,
            name,
            loc,
        });
    }

    /// If `canon` is a nested record still awaiting a name, the member
    /// identifier in `name` becomes its var-kind typename (for
    /// `struct { ... } inst;` nested in a record). Returns whether a name
    /// was claimed.
    pub fn claim_member_name(&mut self, canon: &CanonId, name: &str, loc: LocCtx) -> bool {
        let Some(index) = self.unnamed.get(canon).copied() else {
            return false;
        };
        // never the primary record; its name comes from a sibling declarator
        if index == 0 {
            return false;
        }
        self.unnamed.remove(canon);

        let staged = &mut self.new_types[index];
        staged.name = Some((NameKind::Var, name.to_string()));
        staged.name_loc = loc;
        true
    }

    /// Record a declaration-use of `base` within the record at the top of
    /// the parent stack.
    pub fn stage_type_use(&mut self, base: CanonId, loc: LocCtx) {
        let within = self
            .parents
            .last()
            .expect("type use staged with no enclosing record")
            .clone();
        self.type_uses.push(StagedUse { within, base, loc });
    }

    /// Push the nearest-named-ancestor stack. Truly-anonymous records must
    /// not be pushed.
    pub fn push_parent(&mut self, canon: CanonId) {
        self.parents.push(canon);
    }

    pub fn pop_parent(&mut self) {
        self.parents.pop().expect("parent stack underflow");
    }

    /// Serialize the staged state into `store`.
    ///
    /// Steps:
    /// - build a scratch map (canonical -> new rowid)
    /// - insert named records in staging order, discarding entries still in
    ///   the unnamed set; records whose typename preexists go straight into
    ///   the TU-wide `type_map` instead of the scratch map
    /// - insert members whose parent is in the scratch map *only* (the
    ///   enclosing record was newly persisted by this commit); base types
    ///   translate through either map
    /// - insert type uses under the same scratch-only gate
    /// - merge the scratch map into `type_map`
    ///
    /// Store failures are logged and the commit continues; one bad entry
    /// must not discard the rest of the record.
    pub fn commit(&mut self, store: &mut Store, type_map: &mut HashMap<CanonId, TypeRef>) {
        debug!(
            types = self.new_types.len(),
            members = self.members.len(),
            uses = self.type_uses.len(),
            nameless = self.unnamed.len(),
            "commit scoreboard"
        );

        let mut scratch: HashMap<CanonId, TypeRef> = HashMap::new();

        for staged in &self.new_types {
            if self.unnamed.contains_key(&staged.canon) {
                warn!(type_id = %staged.canon.0, "record has no name, discarding");
                continue;
            }
            commit_one_record(staged, store, &mut scratch, type_map);
        }

        for member in &self.members {
            // parent must be newly inserted by this commit
            let Some(parent) = scratch.get(&member.parent) else {
                continue;
            };
            let base_type = match &member.base {
                // absent reference for primitive-typed members
                None => TypeRef::NONE,
                Some(base) => match scratch.get(base).or_else(|| type_map.get(base)) {
                    Some(id) => *id,
                    None => {
                        error!(base = %base.0, member = %member.name, "no entry for member base type");
                        continue;
                    }
                },
            };
            let entry = MemberEntry {
                parent: *parent,
                base_type,
                name: member.name.clone(),
            };
            if let Err(err) = store.member_insert(&member.loc, &entry) {
                error!(member = %entry.name, %err, "cannot insert member");
            }
        }

        for use_ in &self.type_uses {
            // skip uses inside records that preexisted (a reindexed header)
            if !scratch.contains_key(&use_.within) {
                continue;
            }
            let Some(base) = scratch.get(&use_.base).or_else(|| type_map.get(&use_.base)) else {
                error!(base = %use_.base.0, "no entry for used type");
                continue;
            };
            let entry = TypeUseEntry {
                base_type: *base,
                kind: TypeUseKind::Decl,
            };
            if let Err(err) = store.type_use_insert(&use_.loc, &entry) {
                error!(%err, "cannot insert type use");
            }
        }

        type_map.extend(scratch);
    }
}

/// Persist one staged record: pre-look-up its name, and insert the type and
/// typename rows when it is new.
///
/// Known gap: if the typename insert fails after the type insert succeeded,
/// the type row is left in place. No read path reaches a type row without a
/// typename, so the orphan is harmless, but it is an orphan.
fn commit_one_record(
    staged: &StagedType,
    store: &mut Store,
    scratch: &mut HashMap<CanonId, TypeRef>,
    type_map: &mut HashMap<CanonId, TypeRef>,
) {
    let (kind, name) = staged
        .name
        .as_ref()
        .expect("named record has no staged name");

    match store.typename_lookup(&staged.name_loc, name, *kind) {
        Ok(preexisting) => {
            // seen in an earlier commit or an earlier translation unit
            debug!(name = %name, id = preexisting.0, "record preexists");
            type_map.insert(staged.canon.clone(), preexisting);
            return;
        }
        Err(StoreError::NotFound) => {}
        Err(err) => {
            // can't determine whether the record preexists
            error!(name = %name, %err, "typename pre-lookup failed");
            return;
        }
    }

    let id = match store.type_insert(&staged.loc, &staged.entry) {
        Ok(id) => id,
        Err(err) => {
            error!(name = %name, kind = %staged.entry.kind, %err, "cannot insert type");
            return;
        }
    };

    let entry = TypenameEntry {
        kind: *kind,
        base_type: id,
        name: name.clone(),
    };
    if let Err(err) = store.typename_insert(&staged.name_loc, &entry) {
        error!(name = %name, id = id.0, %err, "cannot insert primary typename");
        return;
    }

    scratch.insert(staged.canon.clone(), id);
}
