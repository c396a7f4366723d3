//! Update commands.
//!
//! Command constructors consume the record handle. Commands are in turn
//! consumed by `ddbridge_apply_updates`, or by `ddbridge_encode_commands`,
//! which produces the batch encoding accepted by
//! `ddbridge_apply_updates_from_buffer`.

use crate::buffer::DdBuffer;
use crate::error::{clear_last_error, fail, null_argument, DdResult};
use crate::types::{
    borrowed_handle, command_from_handle, command_into_handle, command_ref, record_from_handle,
    take_commands, DdCommand, DdRecord,
};
use ddbridge_core::engine::memory::encode_updates;
use ddbridge_core::{Command, TableId};
use ddbridge_record::Record;

unsafe fn build(
    table: u32,
    record: *mut DdRecord,
    make: fn(TableId, Record) -> Command,
) -> *mut DdCommand {
    clear_last_error();
    if record.is_null() {
        null_argument();
        return std::ptr::null_mut();
    }
    command_into_handle(make(TableId::new(table), record_from_handle(record)))
}

/// Creates an insert command, consuming `record`.
///
/// # Safety
///
/// `record` must be an owned record handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_insert_cmd(table: u32, record: *mut DdRecord) -> *mut DdCommand {
    build(table, record, Command::insert)
}

/// Creates a delete-by-value command, consuming `record`.
///
/// # Safety
///
/// `record` must be an owned record handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_delete_val_cmd(
    table: u32,
    record: *mut DdRecord,
) -> *mut DdCommand {
    build(table, record, Command::delete_val)
}

/// Creates a delete-by-key command, consuming `key`.
///
/// # Safety
///
/// `key` must be an owned record handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_delete_key_cmd(table: u32, key: *mut DdRecord) -> *mut DdCommand {
    build(table, key, Command::delete_key)
}

/// Returns the target table of a command, or `u32::MAX` for null.
///
/// # Safety
///
/// `command` must be null or a live command handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_command_table(command: *const DdCommand) -> u32 {
    if command.is_null() {
        return u32::MAX;
    }
    command_ref(command).table.as_u32()
}

/// Borrows the record of a command, or returns null.
///
/// # Safety
///
/// `command` must be null or a live command handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_command_record(command: *const DdCommand) -> *const DdRecord {
    if command.is_null() {
        return std::ptr::null();
    }
    borrowed_handle(&command_ref(command).record)
}

/// Frees a command that was never submitted. Null is ignored.
///
/// # Safety
///
/// `command` must be null or an owned command handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_free_command(command: *mut DdCommand) {
    if !command.is_null() {
        drop(command_from_handle(command));
    }
}

/// Encodes `len` commands into a batch buffer, consuming them.
///
/// # Safety
///
/// `commands` must point to `len` owned command handles and `out` must be
/// writable. Free the buffer with `ddbridge_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_encode_commands(
    commands: *const *mut DdCommand,
    len: usize,
    out: *mut DdBuffer,
) -> DdResult {
    clear_last_error();
    let batch = take_commands(commands, len);
    let (Some(batch), false) = (batch, out.is_null()) else {
        return null_argument();
    };
    match encode_updates(&batch) {
        Ok(bytes) => {
            out.write(DdBuffer::from_vec(bytes));
            DdResult::Ok
        }
        Err(e) => fail(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ddbridge_i64, ddbridge_is_i64};
    use ddbridge_core::{Config, Engine, MemoryProgram, Program};

    #[test]
    fn command_accessors() {
        unsafe {
            let cmd = ddbridge_insert_cmd(3, ddbridge_i64(5));
            assert_eq!(ddbridge_command_table(cmd), 3);
            assert!(ddbridge_is_i64(ddbridge_command_record(cmd)));
            ddbridge_free_command(cmd);

            assert!(ddbridge_delete_key_cmd(0, std::ptr::null_mut()).is_null());
            assert_eq!(ddbridge_command_table(std::ptr::null()), u32::MAX);
        }
    }

    #[test]
    fn encoded_batch_applies_to_engine() {
        let program = MemoryProgram::new()
            .input("Num")
            .output("Same")
            .rule("Num", "Same", |r| vec![r.clone()]);
        let mut engine = program.instantiate(&Config::new().workers(1)).unwrap();

        let mut out = DdBuffer::empty();
        unsafe {
            let cmds = [ddbridge_insert_cmd(0, ddbridge_i64(1)), ddbridge_insert_cmd(0, ddbridge_i64(2))];
            assert_eq!(ddbridge_encode_commands(cmds.as_ptr(), 2, &mut out), DdResult::Ok);
        }
        let bytes = unsafe { out.into_vec() };

        engine.transaction_start().unwrap();
        engine.apply_updates_from_buffer(&bytes, 0).unwrap();
        let delta = engine.commit().unwrap();
        assert_eq!(delta.len(), 2);
        assert!(delta.iter().all(|d| d.weight == 1));
    }
}
