//! Opaque handles.
//!
//! Records, commands, programs and engines are boxed on the Rust side and
//! handed out as pointers to zero-sized opaque structs. A handle returned by a
//! constructor is owned by the caller until it is freed or passed to a
//! function that takes ownership (composite and command constructors).
//! Handles returned by accessors are borrowed from their parent and must
//! not be freed.

use ddbridge_core::Command;
use ddbridge_record::Record;

/// An opaque record handle.
#[repr(C)]
pub struct DdRecord {
    _private: [u8; 0],
}

/// An opaque command handle.
#[repr(C)]
pub struct DdCommand {
    _private: [u8; 0],
}

/// An opaque program handle.
#[repr(C)]
pub struct DdProgram {
    _private: [u8; 0],
}

/// An opaque running engine handle.
#[repr(C)]
pub struct DdEngine {
    _private: [u8; 0],
}

pub(crate) fn record_into_handle(record: Record) -> *mut DdRecord {
    Box::into_raw(Box::new(record)).cast()
}

/// # Safety
///
/// `ptr` must be an owned, live record handle.
pub(crate) unsafe fn record_from_handle(ptr: *mut DdRecord) -> Record {
    *Box::from_raw(ptr.cast::<Record>())
}

/// # Safety
///
/// `ptr` must be a live record handle, owned or borrowed.
pub(crate) unsafe fn record_ref<'a>(ptr: *const DdRecord) -> &'a Record {
    &*ptr.cast::<Record>()
}

pub(crate) fn borrowed_handle(record: &Record) -> *const DdRecord {
    (record as *const Record).cast()
}

pub(crate) fn command_into_handle(command: Command) -> *mut DdCommand {
    Box::into_raw(Box::new(command)).cast()
}

/// # Safety
///
/// `ptr` must be an owned, live command handle.
pub(crate) unsafe fn command_from_handle(ptr: *mut DdCommand) -> Command {
    *Box::from_raw(ptr.cast::<Command>())
}

/// # Safety
///
/// `ptr` must be a live command handle.
pub(crate) unsafe fn command_ref<'a>(ptr: *const DdCommand) -> &'a Command {
    &*ptr.cast::<Command>()
}

/// Takes ownership of every non-null handle in `ptrs[..len]`.
///
/// Returns `None` if the array or any element is null; the non-null
/// elements are consumed either way.
///
/// # Safety
///
/// `ptrs` must be null or point to `len` handles that are null or owned.
pub(crate) unsafe fn take_records(ptrs: *const *mut DdRecord, len: usize) -> Option<Vec<Record>> {
    if len == 0 {
        return Some(Vec::new());
    }
    if ptrs.is_null() {
        return None;
    }
    let handles = std::slice::from_raw_parts(ptrs, len);
    let mut records = Vec::with_capacity(len);
    let mut complete = true;
    for &handle in handles {
        if handle.is_null() {
            complete = false;
        } else {
            records.push(record_from_handle(handle));
        }
    }
    complete.then_some(records)
}

/// Takes ownership of every non-null handle in `ptrs[..len]`.
///
/// Same contract as [`take_records`].
///
/// # Safety
///
/// `ptrs` must be null or point to `len` handles that are null or owned.
pub(crate) unsafe fn take_commands(ptrs: *const *mut DdCommand, len: usize) -> Option<Vec<Command>> {
    if len == 0 {
        return Some(Vec::new());
    }
    if ptrs.is_null() {
        return None;
    }
    let handles = std::slice::from_raw_parts(ptrs, len);
    let mut commands = Vec::with_capacity(len);
    let mut complete = true;
    for &handle in handles {
        if handle.is_null() {
            complete = false;
        } else {
            commands.push(command_from_handle(handle));
        }
    }
    complete.then_some(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddbridge_core::TableId;

    #[test]
    fn record_handles() {
        let handle = record_into_handle(Record::i64(7));
        // Safety: created above
        unsafe {
            assert_eq!(record_ref(handle).get_i64().unwrap(), 7);
            assert_eq!(record_from_handle(handle), Record::i64(7));
        }
    }

    #[test]
    fn command_handles() {
        let handle = command_into_handle(Command::insert(TableId::new(1), Record::bool(true)));
        // Safety: created above
        unsafe {
            assert_eq!(command_ref(handle).table, TableId::new(1));
            let command = command_from_handle(handle);
            assert_eq!(command.record, Record::bool(true));
        }
    }

    #[test]
    fn take_records_consumes_everything() {
        let handles = [record_into_handle(Record::i64(1)), std::ptr::null_mut()];
        // Safety: the non-null handle is owned and consumed here
        assert!(unsafe { take_records(handles.as_ptr(), 2) }.is_none());

        let handles = [record_into_handle(Record::i64(1)), record_into_handle(Record::i64(2))];
        let records = unsafe { take_records(handles.as_ptr(), 2) }.unwrap();
        assert_eq!(records, vec![Record::i64(1), Record::i64(2)]);

        assert_eq!(unsafe { take_records(std::ptr::null(), 0) }, Some(Vec::new()));
        assert!(unsafe { take_records(std::ptr::null(), 3) }.is_none());
    }
}
