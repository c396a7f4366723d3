//! In-process engine.
//!
//! Input relations hold sets of records and may declare a primary key.
//! Output relations are multisets derived by rules: each rule maps one
//! record of an input relation to zero or more output records. Commits
//! push the transaction's input delta through the rules, so output
//! weights can exceed one when several inputs derive the same record.
//!
//! ```
//! use ddbridge_core::engine::MemoryProgram;
//! use ddbridge_record::Record;
//!
//! let program = MemoryProgram::new()
//!     .input("Edge")
//!     .output("Source")
//!     .rule("Edge", "Source", |edge| vec![edge.tuple_field(0).unwrap().clone()]);
//! # let _ = program;
//! ```

use crate::buffer::FlatBuffer;
use crate::command::{Command, CommandKind};
use crate::config::Config;
use crate::engine::{Engine, Program};
use crate::error::{CoreError, CoreResult};
use crate::logging::{self, LOG_DEBUG};
use crate::recording::{RelationSnapshot, Snapshot};
use crate::types::{ClearStatus, DeltaEntry, RelationRole, TableId};
use bytes::Bytes;
use ddbridge_record::Record;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Space left in front of encoded deltas, as flat buffer builders do.
const BUFFER_HEADROOM: usize = 16;

type KeyFn = Arc<dyn Fn(&Record) -> Record + Send + Sync>;
type RuleFn = Arc<dyn Fn(&Record) -> Vec<Record> + Send + Sync>;

struct RelationDecl {
    name: String,
    role: RelationRole,
    key: Option<KeyFn>,
}

struct RuleDecl {
    input: String,
    output: String,
    derive: RuleFn,
}

/// Declarative description of relations and rules.
#[derive(Default)]
pub struct MemoryProgram {
    relations: Vec<RelationDecl>,
    rules: Vec<RuleDecl>,
}

impl MemoryProgram {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an input relation without a primary key.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.relations.push(RelationDecl {
            name: name.into(),
            role: RelationRole::Input,
            key: None,
        });
        self
    }

    /// Declares an input relation whose primary key is computed by `key`.
    #[must_use]
    pub fn keyed_input(
        mut self,
        name: impl Into<String>,
        key: impl Fn(&Record) -> Record + Send + Sync + 'static,
    ) -> Self {
        self.relations.push(RelationDecl {
            name: name.into(),
            role: RelationRole::Input,
            key: Some(Arc::new(key)),
        });
        self
    }

    /// Declares an output relation.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.relations.push(RelationDecl {
            name: name.into(),
            role: RelationRole::Output,
            key: None,
        });
        self
    }

    /// Adds a rule deriving `output` records from each `input` record.
    #[must_use]
    pub fn rule(
        mut self,
        input: impl Into<String>,
        output: impl Into<String>,
        derive: impl Fn(&Record) -> Vec<Record> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(RuleDecl {
            input: input.into(),
            output: output.into(),
            derive: Arc::new(derive),
        });
        self
    }
}

impl Program for MemoryProgram {
    fn instantiate(&self, config: &Config) -> CoreResult<Box<dyn Engine>> {
        Ok(Box::new(MemoryEngine::new(self, config)?))
    }
}

struct Relation {
    name: String,
    role: RelationRole,
    key: Option<KeyFn>,
    /// Input facts.
    rows: BTreeSet<Record>,
    /// Primary key index over `rows`.
    by_key: BTreeMap<Record, Record>,
    /// Output multiset, kept only with `store_data`.
    stored: BTreeMap<Record, i64>,
}

impl Relation {
    /// Returns the record if it was not already present.
    fn insert(&mut self, record: Record) -> CoreResult<Option<Record>> {
        if self.rows.contains(&record) {
            return Ok(None);
        }
        if let Some(key_fn) = &self.key {
            let key = key_fn(&record);
            if let Some(existing) = self.by_key.get(&key) {
                return Err(CoreError::engine(format!(
                    "duplicate key {key} in {}: {existing} is already present",
                    self.name
                )));
            }
            self.by_key.insert(key, record.clone());
        }
        self.rows.insert(record.clone());
        Ok(Some(record))
    }

    fn remove(&mut self, record: &Record) -> bool {
        if !self.rows.remove(record) {
            return false;
        }
        if let Some(key_fn) = &self.key {
            self.by_key.remove(&key_fn(record));
        }
        true
    }

    fn remove_key(&mut self, key: &Record) -> CoreResult<Option<Record>> {
        if self.key.is_none() {
            return Err(CoreError::engine(format!(
                "relation {} has no primary key",
                self.name
            )));
        }
        Ok(self.by_key.remove(key).map(|record| {
            self.rows.remove(&record);
            record
        }))
    }

    fn restore(&mut self, record: Record) {
        if let Some(key_fn) = &self.key {
            self.by_key.insert(key_fn(&record), record.clone());
        }
        self.rows.insert(record);
    }

    fn apply_weight(&mut self, record: &Record, weight: i64) {
        let count = self.stored.entry(record.clone()).or_insert(0);
        *count += weight;
        if *count <= 0 {
            self.stored.remove(record);
        }
    }
}

struct Rule {
    input: TableId,
    output: TableId,
    derive: RuleFn,
}

/// Inverse of one applied input change.
enum Undo {
    Inserted(TableId, Record),
    Removed(TableId, Record),
}

#[derive(Default)]
struct Profile {
    cpu_profiling: bool,
    commits: u64,
    changes: u64,
    commit_time: Duration,
}

/// Running instance of a [`MemoryProgram`].
pub struct MemoryEngine {
    relations: Vec<Relation>,
    names: HashMap<String, TableId>,
    rules: Vec<Rule>,
    store_data: bool,
    workers: usize,
    log_module: i32,
    /// Undo log of the open transaction.
    journal: Option<Vec<Undo>>,
    /// Issued flat buffers: address -> (size, offset).
    outstanding: HashMap<usize, (usize, usize)>,
    profile: Profile,
}

impl MemoryEngine {
    /// Builds an engine from a program.
    ///
    /// # Errors
    ///
    /// Fails if `workers` is zero, a relation name is declared twice, or a
    /// rule names a missing relation or one with the wrong role.
    pub fn new(program: &MemoryProgram, config: &Config) -> CoreResult<Self> {
        if config.workers == 0 {
            return Err(CoreError::engine("workers must be at least 1"));
        }

        let mut names = HashMap::new();
        let mut relations = Vec::with_capacity(program.relations.len());
        for (index, decl) in program.relations.iter().enumerate() {
            let id = u32::try_from(index)
                .map(TableId::new)
                .map_err(|_| CoreError::engine("too many relations"))?;
            if names.insert(decl.name.clone(), id).is_some() {
                return Err(CoreError::engine(format!(
                    "relation {} declared twice",
                    decl.name
                )));
            }
            relations.push(Relation {
                name: decl.name.clone(),
                role: decl.role,
                key: decl.key.clone(),
                rows: BTreeSet::new(),
                by_key: BTreeMap::new(),
                stored: BTreeMap::new(),
            });
        }

        let resolve = |name: &str, role: RelationRole| -> CoreResult<TableId> {
            let id = names
                .get(name)
                .copied()
                .ok_or_else(|| CoreError::engine(format!("rule names unknown relation {name}")))?;
            if relations[id.0 as usize].role != role {
                return Err(CoreError::engine(format!(
                    "rule expects {name} to be an {role:?} relation"
                )));
            }
            Ok(id)
        };
        let rules = program
            .rules
            .iter()
            .map(|decl| {
                Ok(Rule {
                    input: resolve(&decl.input, RelationRole::Input)?,
                    output: resolve(&decl.output, RelationRole::Output)?,
                    derive: Arc::clone(&decl.derive),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            relations,
            names,
            rules,
            store_data: config.store_data,
            workers: config.workers,
            log_module: config.log_module,
            journal: None,
            outstanding: HashMap::new(),
            profile: Profile {
                cpu_profiling: config.cpu_profiling,
                ..Profile::default()
            },
        })
    }

    fn relation(&self, table: TableId) -> CoreResult<&Relation> {
        self.relations
            .get(table.0 as usize)
            .ok_or_else(|| CoreError::engine(format!("unknown relation {table}")))
    }

    fn input_mut(&mut self, table: TableId) -> CoreResult<&mut Relation> {
        let relation = self
            .relations
            .get_mut(table.0 as usize)
            .ok_or_else(|| CoreError::engine(format!("unknown relation {table}")))?;
        if relation.role != RelationRole::Input {
            return Err(CoreError::engine(format!(
                "{} is not an input relation",
                relation.name
            )));
        }
        Ok(relation)
    }

    fn journal_mut(&mut self) -> CoreResult<&mut Vec<Undo>> {
        self.journal
            .as_mut()
            .ok_or_else(|| CoreError::engine("no transaction in progress"))
    }

    fn apply_one(&mut self, command: Command) -> CoreResult<Option<Undo>> {
        let table = command.table;
        let record = command.record.normalize();
        let relation = self.input_mut(table)?;
        let undo = match command.kind {
            CommandKind::Insert => relation.insert(record)?.map(|r| Undo::Inserted(table, r)),
            CommandKind::DeleteByValue => relation
                .remove(&record)
                .then(|| Undo::Removed(table, record)),
            CommandKind::DeleteByKey => relation
                .remove_key(&record)?
                .map(|r| Undo::Removed(table, r)),
        };
        Ok(undo)
    }

    fn undo(&mut self, ops: Vec<Undo>) {
        for op in ops.into_iter().rev() {
            match op {
                Undo::Inserted(table, record) => {
                    if let Some(rel) = self.relations.get_mut(table.0 as usize) {
                        rel.remove(&record);
                    }
                }
                Undo::Removed(table, record) => {
                    if let Some(rel) = self.relations.get_mut(table.0 as usize) {
                        rel.restore(record);
                    }
                }
            }
        }
    }

    /// Pushes the input delta of `journal` through the rules.
    fn derive(&self, journal: Vec<Undo>) -> Vec<DeltaEntry> {
        let mut input: BTreeMap<(TableId, Record), i64> = BTreeMap::new();
        for op in journal {
            match op {
                Undo::Inserted(table, record) => *input.entry((table, record)).or_insert(0) += 1,
                Undo::Removed(table, record) => *input.entry((table, record)).or_insert(0) -= 1,
            }
        }

        let mut output: BTreeMap<(TableId, Record), i64> = BTreeMap::new();
        for ((table, record), weight) in input.iter().filter(|(_, w)| **w != 0) {
            for rule in self.rules.iter().filter(|r| r.input == *table) {
                for derived in (rule.derive)(record) {
                    *output.entry((rule.output, derived.normalize())).or_insert(0) += weight;
                }
            }
        }

        output
            .into_iter()
            .filter(|(_, weight)| *weight != 0)
            .map(|((table, record), weight)| DeltaEntry {
                table,
                record,
                weight,
            })
            .collect()
    }
}

/// Encodes commands for `apply_updates_from_buffer`.
pub fn encode_updates(commands: &[Command]) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(commands, &mut out).map_err(|e| CoreError::encoding(e.to_string()))?;
    Ok(out)
}

/// Decodes a delta produced by `commit_to_buffer`.
pub fn decode_changes(buffer: &FlatBuffer) -> CoreResult<Vec<DeltaEntry>> {
    ciborium::from_reader(buffer.message()).map_err(|e| CoreError::encoding(e.to_string()))
}

impl Engine for MemoryEngine {
    fn relation_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    fn transaction_start(&mut self) -> CoreResult<()> {
        if self.journal.is_some() {
            return Err(CoreError::engine("transaction already in progress"));
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn apply_updates(&mut self, commands: Vec<Command>) -> CoreResult<()> {
        self.journal_mut()?;
        let mut applied = Vec::with_capacity(commands.len());
        for command in commands {
            match self.apply_one(command) {
                Ok(Some(undo)) => applied.push(undo),
                Ok(None) => {}
                Err(e) => {
                    self.undo(applied);
                    return Err(e);
                }
            }
        }
        self.journal_mut()?.extend(applied);
        Ok(())
    }

    fn apply_updates_from_buffer(&mut self, bytes: &[u8], position: usize) -> CoreResult<()> {
        let message = bytes
            .get(position..)
            .ok_or_else(|| CoreError::engine("buffer position beyond end of buffer"))?;
        let commands: Vec<Command> =
            ciborium::from_reader(message).map_err(|e| CoreError::encoding(e.to_string()))?;
        self.apply_updates(commands)
    }

    fn clear_relation(&mut self, table: TableId) -> CoreResult<ClearStatus> {
        self.journal_mut()?;
        let Ok(relation) = self.input_mut(table) else {
            return Ok(ClearStatus::NotInputRelation);
        };
        let rows = std::mem::take(&mut relation.rows);
        relation.by_key.clear();
        self.journal_mut()?
            .extend(rows.into_iter().map(|r| Undo::Removed(table, r)));
        Ok(ClearStatus::Cleared)
    }

    fn commit(&mut self) -> CoreResult<Vec<DeltaEntry>> {
        let journal = self
            .journal
            .take()
            .ok_or_else(|| CoreError::engine("no transaction in progress"))?;
        let started = self.profile.cpu_profiling.then(Instant::now);

        let delta = self.derive(journal);
        if self.store_data {
            for entry in &delta {
                if let Some(rel) = self.relations.get_mut(entry.table.0 as usize) {
                    rel.apply_weight(&entry.record, entry.weight);
                }
            }
        }

        self.profile.commits += 1;
        self.profile.changes += delta.len() as u64;
        if let Some(started) = started {
            self.profile.commit_time += started.elapsed();
        }
        logging::log(
            self.log_module,
            LOG_DEBUG,
            &format!(
                "commit {}: {} changed records",
                self.profile.commits,
                delta.len()
            ),
        );
        Ok(delta)
    }

    fn commit_to_buffer(&mut self) -> CoreResult<FlatBuffer> {
        let delta = self.commit()?;
        let mut buf = vec![0u8; BUFFER_HEADROOM];
        ciborium::into_writer(&delta, &mut buf).map_err(|e| CoreError::encoding(e.to_string()))?;
        let size = buf.len() - BUFFER_HEADROOM;
        let fb = FlatBuffer::new(Bytes::from(buf), size, BUFFER_HEADROOM);
        self.outstanding
            .insert(fb.addr(), (fb.size(), fb.offset()));
        Ok(fb)
    }

    fn release_buffer(&mut self, buffer: FlatBuffer) -> CoreResult<()> {
        match self.outstanding.remove(&buffer.addr()) {
            Some((size, offset)) if size == buffer.size() && offset == buffer.offset() => Ok(()),
            Some(issued) => {
                self.outstanding.insert(buffer.addr(), issued);
                Err(CoreError::engine(format!(
                    "buffer released with size {} offset {}, issued with size {} offset {}",
                    buffer.size(),
                    buffer.offset(),
                    issued.0,
                    issued.1
                )))
            }
            None => Err(CoreError::engine(
                "buffer was not issued by this engine or was already released",
            )),
        }
    }

    fn rollback(&mut self) -> CoreResult<()> {
        let journal = self
            .journal
            .take()
            .ok_or_else(|| CoreError::engine("no transaction in progress"))?;
        self.undo(journal);
        Ok(())
    }

    fn for_each_stored(
        &self,
        table: TableId,
        visit: &mut dyn FnMut(&Record) -> bool,
    ) -> CoreResult<()> {
        if !self.store_data {
            return Err(CoreError::feature_disabled("table dump requires store_data"));
        }
        let relation = self.relation(table)?;
        match relation.role {
            RelationRole::Input => {
                for record in &relation.rows {
                    if !visit(record) {
                        break;
                    }
                }
            }
            RelationRole::Output => {
                for record in relation.stored.keys() {
                    if !visit(record) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn input_snapshot(&self) -> CoreResult<Snapshot> {
        let relations = self
            .relations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.role == RelationRole::Input)
            .map(|(index, r)| RelationSnapshot {
                table: TableId::new(index as u32),
                name: r.name.clone(),
                records: r.rows.iter().cloned().collect(),
            })
            .collect();
        Ok(Snapshot { relations })
    }

    fn profile(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "memory engine: {} relations, {} rules, {} workers",
            self.relations.len(),
            self.rules.len(),
            self.workers
        );
        let _ = writeln!(
            out,
            "commits: {}, changed records: {}",
            self.profile.commits, self.profile.changes
        );
        for relation in &self.relations {
            match relation.role {
                RelationRole::Input => {
                    let _ = writeln!(out, "  {} (input): {} records", relation.name, relation.rows.len());
                }
                RelationRole::Output if self.store_data => {
                    let total: i64 = relation.stored.values().sum();
                    let _ = writeln!(
                        out,
                        "  {} (output): {} distinct, {} total",
                        relation.name,
                        relation.stored.len(),
                        total
                    );
                }
                RelationRole::Output => {
                    let _ = writeln!(out, "  {} (output): not stored", relation.name);
                }
            }
        }
        if self.profile.cpu_profiling {
            let _ = write!(out, "cpu profiling: on, commit time {:?}", self.profile.commit_time);
        } else {
            let _ = write!(out, "cpu profiling: off");
        }
        out
    }

    fn enable_cpu_profiling(&mut self, enable: bool) -> CoreResult<()> {
        self.profile.cpu_profiling = enable;
        Ok(())
    }

    fn stop(&mut self) -> CoreResult<()> {
        self.journal = None;
        self.outstanding.clear();
        for relation in &mut self.relations {
            relation.rows.clear();
            relation.by_key.clear();
            relation.stored.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGE: TableId = TableId(0);
    const USER: TableId = TableId(1);
    const SOURCE: TableId = TableId(2);
    const NAME: TableId = TableId(3);

    fn edge(a: i64, b: i64) -> Record {
        Record::tuple(vec![Record::i64(a), Record::i64(b)])
    }

    fn user(id: i64, name: &str) -> Record {
        Record::structure("User", vec![Record::i64(id), Record::string(name)])
    }

    fn program() -> MemoryProgram {
        MemoryProgram::new()
            .input("Edge")
            .keyed_input("User", |u| u.struct_field(0).unwrap().clone())
            .output("Source")
            .output("Name")
            .rule("Edge", "Source", |e| vec![e.tuple_field(0).unwrap().clone()])
            .rule("User", "Name", |u| vec![u.struct_field(1).unwrap().clone()])
    }

    fn engine(store_data: bool) -> MemoryEngine {
        MemoryEngine::new(&program(), &Config::new().workers(2).store_data(store_data)).unwrap()
    }

    fn dump(engine: &MemoryEngine, table: TableId) -> Vec<Record> {
        let mut out = Vec::new();
        engine
            .for_each_stored(table, &mut |r| {
                out.push(r.clone());
                true
            })
            .unwrap();
        out
    }

    #[test]
    fn rejects_bad_programs() {
        let config = Config::new().workers(1);
        assert!(MemoryEngine::new(&program(), &Config::new().workers(0)).is_err());
        assert!(MemoryEngine::new(&MemoryProgram::new().input("A").input("A"), &config).is_err());
        let dangling = MemoryProgram::new().input("A").rule("A", "Missing", |_| vec![]);
        assert!(MemoryEngine::new(&dangling, &config).is_err());
        let backwards = MemoryProgram::new()
            .input("A")
            .output("B")
            .rule("B", "A", |_| vec![]);
        assert!(MemoryEngine::new(&backwards, &config).is_err());
    }

    #[test]
    fn multiplicity_accumulates() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::insert(EDGE, edge(1, 2)),
            Command::insert(EDGE, edge(1, 3)),
            Command::insert(EDGE, edge(2, 3)),
        ])
        .unwrap();
        let delta = e.commit().unwrap();

        assert_eq!(
            delta,
            vec![
                DeltaEntry {
                    table: SOURCE,
                    record: Record::i64(1),
                    weight: 2
                },
                DeltaEntry {
                    table: SOURCE,
                    record: Record::i64(2),
                    weight: 1
                },
            ]
        );
        assert_eq!(dump(&e, SOURCE), vec![Record::i64(1), Record::i64(2)]);

        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::delete_val(EDGE, edge(1, 2))])
            .unwrap();
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].weight, -1);
        assert_eq!(dump(&e, SOURCE).len(), 2);
    }

    #[test]
    fn insert_then_delete_in_one_transaction_cancels() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::insert(EDGE, edge(5, 6)),
            Command::delete_val(EDGE, edge(5, 6)),
        ])
        .unwrap();
        assert!(e.commit().unwrap().is_empty());
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::insert(EDGE, edge(1, 2)),
            Command::insert(EDGE, edge(1, 2)),
        ])
        .unwrap();
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].weight, 1);
    }

    #[test]
    fn reordered_set_is_the_same_fact() {
        let tags = |elems: &[i64]| Record::set(elems.iter().copied().map(Record::i64).collect());
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(EDGE, Record::pair(tags(&[1, 2]), Record::i64(0)))])
            .unwrap();
        e.commit().unwrap();

        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::delete_val(
            EDGE,
            Record::pair(tags(&[2, 1]), Record::i64(0)),
        )])
        .unwrap();
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].weight, -1);
        assert!(e.input_snapshot().unwrap().relations[0].records.is_empty());
        assert!(dump(&e, SOURCE).is_empty());
    }

    #[test]
    fn raw_variants_are_normalized_on_ingress() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::insert(EDGE, Record::pair(Record::int(&[7]), Record::i64(8))),
            Command::insert(
                EDGE,
                Record::Tuple(vec![Record::Int(vec![0, 0, 7]), Record::i64(8)]),
            ),
        ])
        .unwrap();
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].weight, 1);
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(USER, user(1, "ann"))])
            .unwrap();

        let result = e.apply_updates(vec![
            Command::insert(EDGE, Record::pair(Record::int(&[7]), Record::i64(8))),
            Command::insert(USER, user(1, "bob")),
        ]);
        assert!(matches!(result, Err(CoreError::Engine { .. })));

        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].table, NAME);
        assert!(dump(&e, EDGE).is_empty());
    }

    #[test]
    fn delete_by_key() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(USER, user(1, "ann"))])
            .unwrap();
        e.commit().unwrap();

        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::delete_key(USER, Record::i64(1)),
            Command::delete_key(USER, Record::i64(99)),
        ])
        .unwrap();
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].record, Record::string("ann"));
        assert_eq!(delta[0].weight, -1);
        assert!(dump(&e, USER).is_empty());
    }

    #[test]
    fn delete_by_key_needs_a_key() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        assert!(e
            .apply_updates(vec![Command::delete_key(EDGE, Record::i64(1))])
            .is_err());
    }

    #[test]
    fn missing_value_delete_is_silent() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::delete_val(EDGE, edge(4, 4))])
            .unwrap();
        assert!(e.commit().unwrap().is_empty());
    }

    #[test]
    fn commands_to_outputs_are_rejected() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        assert!(e
            .apply_updates(vec![Command::insert(SOURCE, Record::i64(1))])
            .is_err());
        assert!(e
            .apply_updates(vec![Command::insert(TableId::new(40), Record::i64(1))])
            .is_err());
    }

    #[test]
    fn rollback_restores_inputs() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(USER, user(1, "ann"))])
            .unwrap();
        e.commit().unwrap();

        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::delete_key(USER, Record::i64(1)),
            Command::insert(USER, user(1, "bob")),
        ])
        .unwrap();
        e.rollback().unwrap();

        assert_eq!(dump(&e, USER), vec![user(1, "ann")]);
        e.transaction_start().unwrap();
        assert!(e.commit().unwrap().is_empty());
    }

    #[test]
    fn clear_relation_status() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![
            Command::insert(EDGE, edge(1, 2)),
            Command::insert(EDGE, edge(3, 4)),
        ])
        .unwrap();
        e.commit().unwrap();

        e.transaction_start().unwrap();
        assert_eq!(e.clear_relation(EDGE).unwrap(), ClearStatus::Cleared);
        assert_eq!(
            e.clear_relation(SOURCE).unwrap(),
            ClearStatus::NotInputRelation
        );
        assert_eq!(
            e.clear_relation(TableId::new(99)).unwrap(),
            ClearStatus::NotInputRelation
        );
        let delta = e.commit().unwrap();
        assert_eq!(delta.len(), 2);
        assert!(delta.iter().all(|d| d.weight == -1));
    }

    #[test]
    fn dump_requires_store_data() {
        let mut e = engine(false);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(EDGE, edge(1, 2))])
            .unwrap();
        assert_eq!(e.commit().unwrap().len(), 1);

        let result = e.for_each_stored(SOURCE, &mut |_| true);
        assert!(matches!(result, Err(CoreError::FeatureDisabled { .. })));
        assert!(e.profile().contains("not stored"));
    }

    #[test]
    fn dump_stops_early() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates((0..10).map(|i| Command::insert(EDGE, edge(i, i))).collect())
            .unwrap();
        e.commit().unwrap();

        let mut seen = 0;
        e.for_each_stored(EDGE, &mut |_| {
            seen += 1;
            seen < 3
        })
        .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn buffers_round_trip_through_the_engine() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        let mut bytes = vec![0xAA; 4];
        bytes.extend(encode_updates(&[Command::insert(EDGE, edge(1, 2))]).unwrap());
        e.apply_updates_from_buffer(&bytes, 4).unwrap();
        let fb = e.commit_to_buffer().unwrap();

        assert_eq!(fb.offset(), BUFFER_HEADROOM);
        let delta = decode_changes(&fb).unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].record, Record::i64(1));

        e.release_buffer(fb).unwrap();
    }

    #[test]
    fn release_checks_the_triple() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        let fb = e.commit_to_buffer().unwrap();
        let forged = FlatBuffer::new(fb.buffer().clone(), fb.size() + 1, fb.offset());
        assert!(e.release_buffer(forged).is_err());
        e.release_buffer(fb).unwrap();

        let stranger = FlatBuffer::new(Bytes::from(vec![1, 2, 3]), 3, 0);
        assert!(e.release_buffer(stranger).is_err());
    }

    #[test]
    fn snapshot_lists_inputs_only() {
        let mut e = engine(true);
        e.transaction_start().unwrap();
        e.apply_updates(vec![Command::insert(EDGE, edge(1, 2))])
            .unwrap();
        e.commit().unwrap();

        let snap = e.input_snapshot().unwrap();
        let names: Vec<_> = snap.relations.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Edge", "User"]);
        assert_eq!(snap.relations[0].records, vec![edge(1, 2)]);
    }

    #[test]
    fn updates_need_a_transaction() {
        let mut e = engine(true);
        assert!(e
            .apply_updates(vec![Command::insert(EDGE, edge(1, 2))])
            .is_err());
        assert!(e.commit().is_err());
        assert!(e.rollback().is_err());
    }
}
