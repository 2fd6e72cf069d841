//! Core indexing — libclang ASTs in, store entries out.
//!
//! One [`Indexer`] processes a whole project. Most of its state is specific
//! to the translation unit in hand and is reset between TUs: the file map
//! (front-end file path -> [`FileRef`]) because front-end handles are not
//! stable across TUs, and the type map ([`CanonId`] -> [`TypeRef`]) because
//! canonical identities are only meaningful within one TU.
//!
//! Only declarations at or above function scope are examined; function
//! bodies are never descended.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clang::{
    Clang, Entity, EntityKind, Index, PrintingPolicyFlag, TranslationUnit, Type as ClangType,
    TypeKind as ClangTypeKind,
};
use tracing::{debug, error, info, warn};

use crate::model::{
    FileRef, FuncRef, LocCtx, NameKind, SCOPE_GLOBAL, TypeEntry, TypeKind, TypeRef, TypenameEntry,
};
use crate::store::{Store, StoreError};

pub mod compdb;
pub mod scoreboard;

pub use scoreboard::CanonId;
use scoreboard::{RecordName, Scoreboard};

/// What the indexer is pointed at.
#[derive(Debug, Clone)]
pub enum InputKind {
    /// A single C source file, compiled with default arguments.
    SourceFile(PathBuf),
    /// A directory containing a `compile_commands.json`; every command in it
    /// is compiled with its recorded arguments and indexed.
    BuildDir(PathBuf),
}

/// Which store backend to index into.
#[derive(Debug, Clone)]
pub enum StoreSpec {
    Nop,
    Mem,
    Sql(PathBuf),
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub input: InputKind,
    pub store: StoreSpec,
    /// Extra front-end arguments appended to every compile.
    pub extra_args: Vec<String>,
}

/// Default compile arguments for single-source-file inputs.
const DEFAULT_ARGS: &[&str] = &["-std=c17", "-x", "c"];

/// Index the project or source file specified by `config` and return the
/// store the entries landed in.
pub fn index_project(config: &IndexConfig) -> Result<Store> {
    let mut store = match &config.store {
        StoreSpec::Nop => Store::open_nop(),
        StoreSpec::Mem => Store::open_mem(),
        StoreSpec::Sql(path) => Store::open_sql(path, false)
            .with_context(|| format!("opening database {}", path.display()))?,
    };
    index_into(&mut store, &config.input, &config.extra_args)?;
    Ok(store)
}

/// Index `input` into an already-open store.
pub fn index_into(store: &mut Store, input: &InputKind, extra_args: &[String]) -> Result<()> {
    let clang =
        Clang::new().map_err(|e| anyhow::anyhow!("failed to initialize libclang: {e}"))?;
    let index = Index::new(&clang, false, false);

    let mut indexer = Indexer::new(store);
    match input {
        InputKind::SourceFile(path) => {
            let mut args: Vec<String> = DEFAULT_ARGS.iter().map(|s| s.to_string()).collect();
            args.extend(extra_args.iter().cloned());
            indexer.index_target(&index, path, &args)?;
        }
        InputKind::BuildDir(dir) => {
            let commands = compdb::load_compile_commands(dir)?;
            info!(dir = %dir.display(), commands = commands.len(), "loaded compilation database");
            for command in &commands {
                let mut args = command.parse_arguments();
                args.extend(extra_args.iter().cloned());
                indexer.index_target(&index, &command.source_path(), &args)?;
                indexer.reset_tu();
            }
        }
    }
    Ok(())
}

struct Indexer<'s> {
    store: &'s mut Store,
    /// Front-end file path -> file row, for the current TU.
    file_map: HashMap<PathBuf, FileRef>,
    /// Canonical type -> type row, for the current TU.
    type_map: HashMap<CanonId, TypeRef>,
    /// Source location of the node being visited.
    loc: LocCtx,
    sb: Scoreboard,
    /// The canonical identity of an unnamed record whose declarator may be
    /// the next sibling node.
    awaiting: Option<CanonId>,
}

impl<'s> Indexer<'s> {
    fn new(store: &'s mut Store) -> Indexer<'s> {
        Indexer {
            store,
            file_map: HashMap::new(),
            type_map: HashMap::new(),
            loc: LocCtx::default(),
            sb: Scoreboard::default(),
            awaiting: None,
        }
    }

    /// Drop TU-specific state. Front-end paths and canonical identities must
    /// not leak into the next TU.
    fn reset_tu(&mut self) {
        self.file_map.clear();
        self.type_map.clear();
        self.loc = LocCtx::default();
        self.sb.reset();
        self.awaiting = None;
    }

    /// Compile one target and index its AST.
    fn index_target(&mut self, index: &Index, path: &Path, args: &[String]) -> Result<()> {
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let tu = index
            .parser(path.to_string_lossy().into_owned())
            .arguments(&arg_refs)
            .detailed_preprocessing_record(true)
            .parse()
            .map_err(|e| anyhow::anyhow!("cannot parse {}: {:?}", path.display(), e))?;

        info!(path = %path.display(), args = args.len(), "made translation unit");

        self.index_includes(&tu, path)?;
        self.index_tu(&tu);
        Ok(())
    }

    /// Populate the file map for this TU before touching declarations: the
    /// main file, then every resolved inclusion from the preprocessing
    /// record. Every location seen later must resolve through this map.
    fn index_includes(&mut self, tu: &TranslationUnit, main: &Path) -> Result<()> {
        let main_ref = self
            .store
            .add_file(main)
            .with_context(|| format!("adding source file {}", main.display()))?;
        // the front-end reports the main file under the spelling it was
        // parsed as
        self.file_map.insert(main.to_path_buf(), main_ref);

        for child in tu.get_entity().get_children() {
            if child.get_kind() != EntityKind::InclusionDirective {
                continue;
            }
            let Some(file) = child.get_file() else {
                // unresolved include; clang already diagnosed it
                continue;
            };
            let path = file.get_path();
            if self.file_map.contains_key(&path) {
                // perhaps from an earlier directive
                continue;
            }
            match self.store.add_file(&path) {
                Ok(file_ref) => {
                    debug!(path = %path.display(), id = file_ref.0, "mapped include");
                    self.file_map.insert(path, file_ref);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot add include file");
                }
            }
        }
        Ok(())
    }

    fn index_tu(&mut self, tu: &TranslationUnit) {
        let children = tu.get_entity().get_children();
        info!(nodes = children.len(), "indexing top-level declarations");
        for child in children {
            self.index_ast_node(child);
        }

        // a record still waiting for its declarator commits nameless rather
        // than leaking into the next TU
        if self.awaiting.take().is_some() {
            warn!("translation unit ended while a record awaited a declarator");
            self.commit_scoreboard();
        }
    }

    /// Handle one top-level AST node.
    ///
    /// Indexing an unnamed record takes two sibling nodes:
    ///
    /// ```c
    /// typedef struct { } foo_t;
    /// ```
    ///
    /// arrives as a record-decl with no name followed by a typedef-decl.
    /// [`Indexer::index_record`] reports that a name is needed; this
    /// function then inspects the *next* sibling as the potential name. If
    /// that fails the record is committed nameless (and discarded) and the
    /// sibling is indexed like any other node.
    fn index_ast_node(&mut self, entity: Entity) {
        if !entity_is_indexable(&entity) {
            return;
        }
        if !self.update_location(&entity) {
            return;
        }

        if let Some(awaited) = self.awaiting.take() {
            let named = self.take_record_name(&entity, &awaited);
            // commit either way; the record got its name now or never will
            self.commit_scoreboard();
            if named {
                return;
            }
        }

        match entity.get_kind() {
            EntityKind::StructDecl | EntityKind::UnionDecl | EntityKind::EnumDecl => {
                if self.index_record(&entity) {
                    self.awaiting = self.sb.primary_canon().cloned();
                    debug!("looking for the record's name on the next node");
                }
            }
            EntityKind::TypedefDecl => self.index_typedef(&entity),
            // functions, variables and member references are not indexed
            _ => {}
        }
    }

    /// Index a struct/union/enum declaration and its subtree through the
    /// scoreboard. Returns true if the record is unnamed and the caller
    /// should treat the next sibling as its potential declarator.
    fn index_record(&mut self, entity: &Entity) -> bool {
        assert!(self.sb.is_empty(), "scoreboard already in use");

        let Some(canon) = self.stage_record_decl(entity) else {
            return false;
        };

        self.sb.push_parent(canon);
        self.walk_record_children(entity);
        self.sb.pop_parent();

        if self.sb.primary_is_unnamed() {
            return true;
        }
        self.commit_scoreboard();
        false
    }

    fn commit_scoreboard(&mut self) {
        self.sb.commit(self.store, &mut self.type_map);
        self.sb.reset();
    }

    /// Stage the record declaration itself (not its children). Returns the
    /// canonical identity when the record was staged; anonymous records are
    /// not staged and return `None`.
    fn stage_record_decl(&mut self, entity: &Entity) -> Option<CanonId> {
        let Some(ty) = entity.get_type() else {
            warn!("record declaration has no type");
            return None;
        };
        let canonical = ty.get_canonical_type();
        let Some(canon) = canon_id(&canonical) else {
            warn!("record declaration has no canonical identity");
            return None;
        };

        let kind = tag_kind(entity);
        if canonical.get_alignof().is_err() {
            // even if the type is completed later, members won't be updated
            warn!(canon = %canon.0, "incomplete record committed as complete");
        }
        let entry = TypeEntry {
            kind,
            complete: true,
        };

        match record_naming(entity, kind) {
            RecordNaming::Anonymous => {
                // C11 nested anonymous record: members are promoted to the
                // nearest named ancestor, the record itself is discarded
                debug!(canon = %canon.0, "anonymous record");
                None
            }
            RecordNaming::Direct(name) => {
                debug!(kind = %kind, name = %name, "index record");
                self.sb
                    .stage_record(canon.clone(), entry, RecordName::Direct(name), self.loc);
                Some(canon)
            }
            RecordNaming::Unnamed => {
                debug!(kind = %kind, canon = %canon.0, "index unnamed record");
                self.sb
                    .stage_record(canon.clone(), entry, RecordName::Unnamed, self.loc);
                Some(canon)
            }
        }
    }

    /// Recursively index the children of a record declaration.
    fn walk_record_children(&mut self, record: &Entity) {
        for child in record.get_children() {
            if !self.update_location(&child) {
                continue;
            }
            match child.get_kind() {
                EntityKind::FieldDecl => self.index_field(&child),
                EntityKind::StructDecl | EntityKind::UnionDecl => {
                    match self.stage_record_decl(&child) {
                        Some(canon) => {
                            self.sb.push_parent(canon);
                            self.walk_record_children(&child);
                            self.sb.pop_parent();
                        }
                        None => {
                            // anonymous: fields attribute to the current
                            // parent record
                            self.walk_record_children(&child);
                        }
                    }
                }
                EntityKind::EnumDecl | EntityKind::EnumConstantDecl => {
                    debug!("nested enums are not indexed");
                }
                _ => {}
            }
        }
    }

    /// Index a member declaration. Generates up to three staged entries:
    /// the member itself, a var-kind typename when the declarator is the
    /// only name of an unnamed nested record, and a decl-use of the
    /// member's type.
    fn index_field(&mut self, field: &Entity) {
        let Some(ty) = field.get_type() else {
            return;
        };
        let canonical = ty.get_canonical_type();
        // primitives stay unreferenced
        let base = if type_is_indexable(&canonical) {
            canon_id(&canonical)
        } else {
            None
        };
        let name = field.get_name().unwrap_or_default();

        debug!(member = %name, "index member");
        self.sb.stage_member(name.clone(), base.clone(), self.loc);

        if let Some(canon) = base {
            self.sb.claim_member_name(&canon, &name, self.loc);
            self.sb.stage_type_use(canon, self.loc);
        }
    }

    /// Try to interpret `entity` as the declarator naming the awaited
    /// unnamed record. True if the name was attached.
    fn take_record_name(&mut self, entity: &Entity, awaited: &CanonId) -> bool {
        let (canon, kind) = match entity.get_kind() {
            EntityKind::VarDecl => {
                let canon = entity.get_type().and_then(|t| canon_id(&t));
                (canon, NameKind::Var)
            }
            EntityKind::TypedefDecl => {
                let canon = entity.get_typedef_underlying_type().and_then(|t| canon_id(&t));
                (canon, NameKind::Typedef)
            }
            _ => {
                // an unnamed record must be followed by a typedef or a
                // variable declarator
                warn!(awaited = %awaited.0, "bad code: record does not declare anything");
                return false;
            }
        };
        let Some(canon) = canon else {
            return false;
        };
        if canon != *awaited {
            warn!(expected = %awaited.0, got = %canon.0, "declarator names a different type");
            return false;
        }
        let Some(name) = entity.get_name() else {
            warn!("declarator has no name");
            return false;
        };

        self.sb.attach_primary_name(kind, name, self.loc);
        true
    }

    /// Index a typedef whose underlying type resolves to an
    /// already-indexed composite.
    fn index_typedef(&mut self, entity: &Entity) {
        let Some(underlying) = entity.get_typedef_underlying_type() else {
            return;
        };
        let Some(canon) = canon_id(&underlying) else {
            return;
        };
        let Some(&base) = self.type_map.get(&canon) else {
            // an incomplete type, a typedef of something unindexable, or
            // the typedef precedes the declaration
            debug!(canon = %canon.0, "typedef of unknown type");
            return;
        };
        let Some(name) = entity.get_name() else {
            return;
        };

        match self.store.typename_lookup(&self.loc, &name, NameKind::Typedef) {
            Ok(existing) => {
                if existing != base {
                    // `typedef A foo_t` vs `typedef B foo_t`; keep the old row
                    error!(name = %name, old = existing.0, new = base.0, "mismatched typedef");
                }
            }
            Err(StoreError::NotFound) => {
                let entry = TypenameEntry {
                    kind: NameKind::Typedef,
                    base_type: base,
                    name: name.clone(),
                };
                match self.store.typename_insert(&self.loc, &entry) {
                    Ok(()) => debug!(name = %name, id = base.0, "added typedef"),
                    Err(err) => error!(name = %name, %err, "cannot persist typedef"),
                }
            }
            Err(err) => {
                error!(name = %name, %err, "cannot look up typename");
            }
        }
    }

    /// Update the current source location from the cursor's expansion
    /// location. Returns false (and logs) when the location cannot be
    /// resolved through the file map; the caller skips the node.
    fn update_location(&mut self, entity: &Entity) -> bool {
        let Some(location) = entity.get_location() else {
            error!("entity has no source location");
            return false;
        };
        let expansion = location.get_expansion_location();
        let Some(file) = expansion.file else {
            error!("source location has no file");
            return false;
        };
        let path = file.get_path();
        let Some(&file_ref) = self.file_map.get(&path) else {
            // every file in a TU is added while indexing inclusions
            error!(path = %path.display(), "no file entry for location");
            return false;
        };

        if self.loc.file != file_ref {
            debug!(from = self.loc.file.0, to = file_ref.0, "file changed");
        }
        self.loc = LocCtx {
            file: file_ref,
            func: FuncRef::NONE,
            scope: SCOPE_GLOBAL,
            line: expansion.line,
            column: expansion.column,
        };
        true
    }
}

/// Coarse filter for top-level nodes; the per-kind indexers have more
/// context on whether a node is worth keeping.
fn entity_is_indexable(entity: &Entity) -> bool {
    match entity.get_kind() {
        EntityKind::StructDecl | EntityKind::UnionDecl | EntityKind::EnumDecl => {
            user_type_is_indexable(entity)
        }
        EntityKind::TypedefDecl => typedef_is_indexable(entity),
        EntityKind::VarDecl => var_is_indexable(entity),
        // functions, member refs, unexposed decls: never indexable
        _ => false,
    }
}

/// Incomplete user-defined types are not indexed.
fn user_type_is_indexable(entity: &Entity) -> bool {
    let Some(ty) = entity.get_type() else {
        return false;
    };
    let canonical = ty.get_canonical_type();
    type_is_indexable(&canonical) && canonical.get_alignof().is_ok()
}

/// Typedefs of primitive types are not indexed.
fn typedef_is_indexable(entity: &Entity) -> bool {
    entity
        .get_typedef_underlying_type()
        .map(|ty| type_is_indexable(&ty.get_canonical_type()))
        .unwrap_or(false)
}

/// Variables are only interesting when their type is composite.
fn var_is_indexable(entity: &Entity) -> bool {
    entity
        .get_type()
        .map(|ty| type_is_indexable(&ty.get_canonical_type()))
        .unwrap_or(false)
}

/// True for struct/union/enum types; false for builtins and for elaborated
/// references that are not declarations.
fn type_is_indexable(ty: &ClangType) -> bool {
    matches!(ty.get_kind(), ClangTypeKind::Record | ClangTypeKind::Enum)
}

/// The canonical identity of a type, via the USR of its canonical
/// declaration. Canonicalizing first makes `struct foo` and a typedef `foo`
/// the same identity.
fn canon_id(ty: &ClangType) -> Option<CanonId> {
    let canonical = ty.get_canonical_type();
    let decl = canonical.get_declaration()?;
    let usr = decl.get_usr()?;
    Some(CanonId(usr.0))
}

fn tag_kind(entity: &Entity) -> TypeKind {
    match entity.get_kind() {
        EntityKind::StructDecl => TypeKind::Struct,
        EntityKind::UnionDecl => TypeKind::Union,
        EntityKind::EnumDecl => TypeKind::Enum,
        other => panic!("cursor {other:?} isn't a tag declaration"),
    }
}

/// The three possible kinds of name a tag declaration can have.
#[derive(Debug)]
enum RecordNaming {
    /// `struct foo {};` and `struct foo {} my_foo;`
    Direct(String),
    /// `typedef struct {} foo_t;`, `struct {} my_foo;`, bare `struct {};`
    Unnamed,
    /// C11 record decls nested in another record: `struct foo { struct {}; };`
    Anonymous,
}

/// Classify how a tag declaration is named.
///
/// The front-end does not directly distinguish `struct {} foo;` from
/// `struct foo {};` at the record cursor, because neither involves a
/// typedef. Printing the cursor with the tag keyword on, the tag body off
/// and terse output makes the difference observable: an unnamed record
/// prints as the bare keyword followed by `{`, a named one includes the tag.
fn record_naming(entity: &Entity, kind: TypeKind) -> RecordNaming {
    // C11 anonymous members first; they never have any name
    if entity.is_anonymous_record_decl() {
        return RecordNaming::Anonymous;
    }

    let printed = entity
        .get_pretty_printer()
        .set_flag(PrintingPolicyFlag::SuppressTagKeyword, false)
        .set_flag(PrintingPolicyFlag::IncludeTagDefinition, false)
        .set_flag(PrintingPolicyFlag::UseTerseOutput, true)
        .print();

    let unnamed = match kind {
        TypeKind::Struct => printed.starts_with("struct {"),
        TypeKind::Union => printed.starts_with("union {"),
        TypeKind::Enum => printed.starts_with("enum {"),
    };
    if unnamed {
        return RecordNaming::Unnamed;
    }

    // gives "foo" for `struct foo`
    RecordNaming::Direct(entity.get_name().unwrap_or_default())
}
