//! Programs, engine lifecycle, transactions and updates for C hosts.
//!
//! A program is assembled with the `ddbridge_program_*` builder, or handed
//! over by an embedding Rust crate through [`program_into_handle`], and
//! started with `ddbridge_start`. The program may be freed once the engine
//! is running.
//!
//! Records passed to callbacks are borrowed for the duration of the call.
//! Callback pointers and their `arg` must stay valid until the engine is
//! stopped (commit and rule callbacks) or the call returns (delta and dump
//! callbacks). Commit callbacks run concurrently on the engine's workers.

use crate::buffer::{read_c_str, DdString};
use crate::error::{clear_last_error, fail, null_argument, set_last_error, DdResult};
use crate::types::{
    borrowed_handle, record_from_handle, take_commands, DdCommand, DdEngine, DdProgram, DdRecord,
};
use ddbridge_core::{
    ChangeEvent, ChangeKind, ClearStatus, Config, CoreError, CoreResult, EngineHandle, FlatBuffer,
    MemoryProgram, Program, TableId,
};
use ddbridge_record::Record;
use std::collections::HashMap;
use std::ffi::c_char;
use std::path::Path;

/// Derives at most one output record from `input`.
///
/// Returns an owned record handle, or null when the rule produces nothing.
pub type DdRuleCallback =
    unsafe extern "C" fn(arg: usize, input: *const DdRecord) -> *mut DdRecord;

/// Returns the primary key of `record` as an owned handle. A null return
/// keys the record by itself.
pub type DdKeyCallback = unsafe extern "C" fn(arg: usize, record: *const DdRecord) -> *mut DdRecord;

/// Receives one change. `insert` is false for deletions.
pub type DdChangeCallback =
    unsafe extern "C" fn(arg: usize, table: u32, record: *const DdRecord, insert: bool);

/// Receives one stored record; returning false stops the dump.
pub type DdDumpCallback = unsafe extern "C" fn(arg: usize, record: *const DdRecord) -> bool;

/// Encoded delta region issued by `ddbridge_transaction_commit_dump_changes_to_buffer`.
///
/// The message is `size` bytes at `buf + offset`. Hand the same triple back
/// to `ddbridge_flatbuf_free`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DdFlatBuf {
    /// Start of the underlying buffer.
    pub buf: *const u8,
    /// Message size in bytes.
    pub size: usize,
    /// Message offset within the buffer.
    pub offset: usize,
}

/// Result of `ddbridge_clear_relation`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdClearStatus {
    /// Every fact was removed.
    Cleared = 0,
    /// The id does not name an input relation.
    NotInputRelation = 1,
}

enum ProgramSlot {
    Memory(MemoryProgram),
    Embedded(Box<dyn Program>),
}

impl ProgramSlot {
    fn program(&self) -> &dyn Program {
        match self {
            ProgramSlot::Memory(program) => program,
            ProgramSlot::Embedded(program) => program.as_ref(),
        }
    }
}

struct EngineSlot {
    handle: EngineHandle,
    /// Buffers handed to the host, by buffer address.
    issued: HashMap<usize, FlatBuffer>,
}

/// # Safety
///
/// `ptr` must be a live program handle.
unsafe fn program_mut<'a>(ptr: *mut DdProgram) -> &'a mut ProgramSlot {
    &mut *ptr.cast::<ProgramSlot>()
}

/// # Safety
///
/// `ptr` must be a live engine handle.
unsafe fn engine_mut<'a>(ptr: *mut DdEngine) -> &'a mut EngineSlot {
    &mut *ptr.cast::<EngineSlot>()
}

/// # Safety
///
/// `ptr` must be null or a valid null-terminated string.
unsafe fn read_arg<'a>(ptr: *const c_char) -> Result<&'a str, DdResult> {
    match read_c_str(ptr) {
        Some(Ok(s)) => Ok(s),
        Some(Err(_)) => {
            set_last_error("invalid UTF-8 in string argument");
            Err(DdResult::InvalidArgument)
        }
        None => Err(null_argument()),
    }
}

/// Runs `op` on a live engine, translating its error.
///
/// # Safety
///
/// `engine` must be null or a live engine handle.
unsafe fn with_engine(
    engine: *mut DdEngine,
    op: impl FnOnce(&mut EngineSlot) -> CoreResult<()>,
) -> DdResult {
    clear_last_error();
    if engine.is_null() {
        return null_argument();
    }
    match op(engine_mut(engine)) {
        Ok(()) => DdResult::Ok,
        Err(e) => fail(&e),
    }
}

fn change_kind_is_insert(event: &ChangeEvent<'_>) -> bool {
    matches!(event.kind, ChangeKind::Insert)
}

// === Programs ===

/// Creates an empty program with no relations or rules.
///
/// Free it with `ddbridge_free_program`.
#[no_mangle]
pub extern "C" fn ddbridge_program_new() -> *mut DdProgram {
    Box::into_raw(Box::new(ProgramSlot::Memory(MemoryProgram::new()))).cast()
}

/// Wraps a program defined in Rust so C hosts can start it.
///
/// Such programs are complete; the `ddbridge_program_*` builder calls
/// reject them with `InvalidArgument`.
pub fn program_into_handle(program: Box<dyn Program>) -> *mut DdProgram {
    Box::into_raw(Box::new(ProgramSlot::Embedded(program))).cast()
}

/// # Safety
///
/// `program` must be null or a live program handle.
unsafe fn extend(
    program: *mut DdProgram,
    build: impl FnOnce(MemoryProgram) -> MemoryProgram,
) -> DdResult {
    if program.is_null() {
        return null_argument();
    }
    match program_mut(program) {
        ProgramSlot::Memory(memory) => {
            *memory = build(std::mem::take(memory));
            DdResult::Ok
        }
        ProgramSlot::Embedded(_) => {
            set_last_error("program does not accept new relations or rules");
            DdResult::InvalidArgument
        }
    }
}

/// Declares an input relation.
///
/// # Safety
///
/// `program` must be a live program handle and `name` a valid string.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_program_input(
    program: *mut DdProgram,
    name: *const c_char,
) -> DdResult {
    clear_last_error();
    match read_arg(name) {
        Ok(name) => extend(program, |p| p.input(name)),
        Err(code) => code,
    }
}

/// Declares an input relation whose records are keyed by `key`.
///
/// # Safety
///
/// `program` must be a live program handle, `name` a valid string, and
/// `key` callable with `arg` from any thread until the engine stops.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_program_keyed_input(
    program: *mut DdProgram,
    name: *const c_char,
    key: Option<DdKeyCallback>,
    arg: usize,
) -> DdResult {
    clear_last_error();
    let Some(key) = key else {
        return null_argument();
    };
    let name = match read_arg(name) {
        Ok(name) => name,
        Err(code) => return code,
    };
    extend(program, |p| {
        p.keyed_input(name, move |record: &Record| {
            // Safety: the host keeps `key` and `arg` valid while the engine runs
            let handle = unsafe { key(arg, borrowed_handle(record)) };
            if handle.is_null() {
                record.clone()
            } else {
                // Safety: the callback returned an owned handle
                unsafe { record_from_handle(handle) }
            }
        })
    })
}

/// Declares an output relation.
///
/// # Safety
///
/// `program` must be a live program handle and `name` a valid string.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_program_output(
    program: *mut DdProgram,
    name: *const c_char,
) -> DdResult {
    clear_last_error();
    match read_arg(name) {
        Ok(name) => extend(program, |p| p.output(name)),
        Err(code) => code,
    }
}

/// Adds a rule deriving `output` records from each `input` record.
///
/// # Safety
///
/// `program` must be a live program handle, both names valid strings, and
/// `derive` callable with `arg` from any thread until the engine stops.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_program_rule(
    program: *mut DdProgram,
    input: *const c_char,
    output: *const c_char,
    derive: Option<DdRuleCallback>,
    arg: usize,
) -> DdResult {
    clear_last_error();
    let Some(derive) = derive else {
        return null_argument();
    };
    let (input, output) = match (read_arg(input), read_arg(output)) {
        (Ok(input), Ok(output)) => (input, output),
        (Err(code), _) | (_, Err(code)) => return code,
    };
    extend(program, |p| {
        p.rule(input, output, move |record: &Record| {
            // Safety: the host keeps `derive` and `arg` valid while the engine runs
            let handle = unsafe { derive(arg, borrowed_handle(record)) };
            if handle.is_null() {
                Vec::new()
            } else {
                // Safety: the callback returned an owned handle
                vec![unsafe { record_from_handle(handle) }]
            }
        })
    })
}

/// Frees a program. Null is ignored.
///
/// # Safety
///
/// `program` must be null or an owned program handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_free_program(program: *mut DdProgram) {
    if !program.is_null() {
        drop(Box::from_raw(program.cast::<ProgramSlot>()));
    }
}

// === Lifecycle ===

/// Starts an engine for `program`.
///
/// With a non-null `on_commit`, every `ddbridge_transaction_commit` reports
/// each changed record once per unit of weight, concurrently on up to
/// `workers` threads.
///
/// # Safety
///
/// `program` must be a live program handle, `out_engine` writable, and
/// `on_commit` callable with `arg` from any thread until the engine stops.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_start(
    program: *const DdProgram,
    workers: usize,
    store_data: bool,
    on_commit: Option<DdChangeCallback>,
    arg: usize,
    out_engine: *mut *mut DdEngine,
) -> DdResult {
    clear_last_error();
    if program.is_null() || out_engine.is_null() {
        return null_argument();
    }
    let program = (*program.cast::<ProgramSlot>()).program();
    let config = Config::new().workers(workers).store_data(store_data);
    let started = match on_commit {
        Some(callback) => {
            EngineHandle::start_with_handler(program, config, move |event: ChangeEvent<'_>| {
                let insert = change_kind_is_insert(&event);
                // Safety: the host keeps `callback` and `arg` valid until stop
                unsafe { callback(arg, event.table.as_u32(), borrowed_handle(event.record), insert) }
            })
        }
        None => EngineHandle::start(program, config),
    };
    match started {
        Ok(handle) => {
            let slot = EngineSlot {
                handle,
                issued: HashMap::new(),
            };
            out_engine.write(Box::into_raw(Box::new(slot)).cast());
            DdResult::Ok
        }
        Err(e) => fail(&e),
    }
}

/// Stops an engine and frees its handle, flushing any active recording.
///
/// Buffers still held by the host are invalidated.
///
/// # Safety
///
/// `engine` must be null or an owned engine handle, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_stop(engine: *mut DdEngine) -> DdResult {
    clear_last_error();
    if engine.is_null() {
        return null_argument();
    }
    let slot = *Box::from_raw(engine.cast::<EngineSlot>());
    match slot.handle.stop() {
        Ok(()) => DdResult::Ok,
        Err(e) => fail(&e),
    }
}

// === Transactions ===

/// Opens a transaction.
///
/// # Safety
///
/// `engine` must be a live engine handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_transaction_start(engine: *mut DdEngine) -> DdResult {
    with_engine(engine, |slot| slot.handle.transaction_start())
}

/// Commits and reports changes to the commit callback given at start.
///
/// # Safety
///
/// `engine` must be a live engine handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_transaction_commit(engine: *mut DdEngine) -> DdResult {
    with_engine(engine, |slot| slot.handle.transaction_commit())
}

/// Commits and reports each changed record once to `callback`, in
/// (table, record) order, from a single thread. The commit callback is not
/// invoked.
///
/// # Safety
///
/// `engine` must be a live engine handle and `callback` callable with
/// `arg` until this call returns.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_transaction_commit_dump_changes(
    engine: *mut DdEngine,
    callback: Option<DdChangeCallback>,
    arg: usize,
) -> DdResult {
    let Some(callback) = callback else {
        clear_last_error();
        return null_argument();
    };
    with_engine(engine, |slot| {
        slot.handle
            .transaction_commit_dump_changes(|event: ChangeEvent<'_>| {
                let insert = change_kind_is_insert(&event);
                // Safety: `callback` is valid for the duration of this call
                unsafe { callback(arg, event.table.as_u32(), borrowed_handle(event.record), insert) }
            })
    })
}

/// Commits and writes the encoded delta region to `out`.
///
/// # Safety
///
/// `engine` must be a live engine handle and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_transaction_commit_dump_changes_to_buffer(
    engine: *mut DdEngine,
    out: *mut DdFlatBuf,
) -> DdResult {
    if out.is_null() {
        clear_last_error();
        return null_argument();
    }
    with_engine(engine, |slot| {
        let buffer = slot.handle.transaction_commit_dump_changes_to_buffer()?;
        let view = DdFlatBuf {
            buf: buffer.buffer().as_ptr(),
            size: buffer.size(),
            offset: buffer.offset(),
        };
        slot.issued.insert(view.buf as usize, buffer);
        // Safety: checked non-null above
        unsafe { out.write(view) };
        Ok(())
    })
}

/// Hands a delta region back to the engine.
///
/// Fails with `Error` unless `buffer` is exactly the triple that was
/// issued; the region then stays valid.
///
/// # Safety
///
/// `engine` must be a live engine handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_flatbuf_free(engine: *mut DdEngine, buffer: DdFlatBuf) -> DdResult {
    with_engine(engine, |slot| {
        let addr = buffer.buf as usize;
        let issued = slot
            .issued
            .remove(&addr)
            .ok_or_else(|| CoreError::engine("flat buffer was not issued by this engine"))?;
        let presented = FlatBuffer::new(issued.buffer().clone(), buffer.size, buffer.offset);
        slot.handle.flatbuf_free(presented).inspect_err(|_| {
            slot.issued.insert(addr, issued);
        })
    })
}

/// Discards the open transaction.
///
/// # Safety
///
/// `engine` must be a live engine handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_transaction_rollback(engine: *mut DdEngine) -> DdResult {
    with_engine(engine, |slot| slot.handle.transaction_rollback())
}

// === Updates ===

/// Applies `len` commands atomically, consuming every command handle
/// whether or not the batch succeeds.
///
/// # Safety
///
/// `engine` must be a live engine handle and `commands` must point to
/// `len` owned command handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_apply_updates(
    engine: *mut DdEngine,
    commands: *const *mut DdCommand,
    len: usize,
) -> DdResult {
    let batch = take_commands(commands, len);
    let Some(batch) = batch else {
        clear_last_error();
        return null_argument();
    };
    with_engine(engine, |slot| slot.handle.apply_updates(batch))
}

/// Applies a batch produced by `ddbridge_encode_commands`, read from
/// `data[position..len]`.
///
/// # Safety
///
/// `engine` must be a live engine handle and `data` must point to `len`
/// readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_apply_updates_from_buffer(
    engine: *mut DdEngine,
    data: *const u8,
    len: usize,
    position: usize,
) -> DdResult {
    if data.is_null() && len > 0 {
        clear_last_error();
        return null_argument();
    }
    let bytes: &[u8] = if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    };
    with_engine(engine, |slot| slot.handle.apply_updates_from_buffer(bytes, position))
}

/// Removes every fact of input relation `table`, reporting whether the id
/// named an input relation.
///
/// # Safety
///
/// `engine` must be a live engine handle and `out_status` writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_clear_relation(
    engine: *mut DdEngine,
    table: u32,
    out_status: *mut DdClearStatus,
) -> DdResult {
    if out_status.is_null() {
        clear_last_error();
        return null_argument();
    }
    with_engine(engine, |slot| {
        let status = match slot.handle.clear_relation(TableId::new(table))? {
            ClearStatus::Cleared => DdClearStatus::Cleared,
            ClearStatus::NotInputRelation => DdClearStatus::NotInputRelation,
        };
        // Safety: checked non-null above
        unsafe { out_status.write(status) };
        Ok(())
    })
}

// === Queries ===

/// Resolves a table name. Unknown names yield `NotFound`.
///
/// # Safety
///
/// `engine` must be a live engine handle, `name` a valid string and `out`
/// writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_table_id(
    engine: *mut DdEngine,
    name: *const c_char,
    out: *mut u32,
) -> DdResult {
    clear_last_error();
    if out.is_null() {
        return null_argument();
    }
    let name = match read_arg(name) {
        Ok(name) => name,
        Err(code) => return code,
    };
    with_engine(engine, |slot| {
        let table = slot.handle.get_table_id(name)?;
        // Safety: checked non-null above
        unsafe { out.write(table.as_u32()) };
        Ok(())
    })
}

/// Streams the stored contents of table `name` to `callback` from one
/// internal thread.
///
/// Fails with `NotFound` for unknown names and `FeatureDisabled` when the
/// engine was started without `store_data`.
///
/// # Safety
///
/// `engine` must be a live engine handle, `name` a valid string and
/// `callback` callable with `arg` until this call returns.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_dump_table(
    engine: *mut DdEngine,
    name: *const c_char,
    callback: Option<DdDumpCallback>,
    arg: usize,
) -> DdResult {
    clear_last_error();
    let Some(callback) = callback else {
        return null_argument();
    };
    let name = match read_arg(name) {
        Ok(name) => name,
        Err(code) => return code,
    };
    with_engine(engine, |slot| {
        slot.handle.dump_table(name, |record: &Record| {
            // Safety: `callback` is valid for the duration of this call
            unsafe { callback(arg, borrowed_handle(record)) }
        })
    })
}

/// Writes the engine profile and bridge counters to `out`.
///
/// # Safety
///
/// `engine` must be a live engine handle and `out` writable. Free the
/// string with `ddbridge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_profile(engine: *mut DdEngine, out: *mut DdString) -> DdResult {
    if out.is_null() {
        clear_last_error();
        return null_argument();
    }
    with_engine(engine, |slot| {
        let text = DdString::from_str(&slot.handle.profile())
            .ok_or_else(|| CoreError::encoding("profile contains a NUL byte"))?;
        // Safety: checked non-null above
        unsafe { out.write(text) };
        Ok(())
    })
}

/// Turns engine CPU profiling on or off.
///
/// # Safety
///
/// `engine` must be a live engine handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_enable_cpu_profiling(engine: *mut DdEngine, enable: bool) -> DdResult {
    with_engine(engine, |slot| slot.handle.enable_cpu_profiling(enable))
}

// === Recording ===

/// Starts, replaces or, with a null `path`, stops the command recording.
///
/// # Safety
///
/// `engine` must be a live engine handle and `path` null or a valid string.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_record_commands(
    engine: *mut DdEngine,
    path: *const c_char,
    append: bool,
) -> DdResult {
    clear_last_error();
    let path = match read_c_str(path) {
        None => None,
        Some(Ok(path)) => Some(Path::new(path)),
        Some(Err(_)) => {
            set_last_error("invalid UTF-8 in path");
            return DdResult::InvalidArgument;
        }
    };
    with_engine(engine, |slot| slot.handle.record_commands(path, append))
}

/// Writes a copy of every input relation to `path`.
///
/// # Safety
///
/// `engine` must be a live engine handle and `path` a valid string.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_dump_input_snapshot(
    engine: *mut DdEngine,
    path: *const c_char,
    append: bool,
) -> DdResult {
    clear_last_error();
    let path = match read_arg(path) {
        Ok(path) => Path::new(path),
        Err(code) => return code,
    };
    with_engine(engine, |slot| slot.handle.dump_input_snapshot(path, append))
}
