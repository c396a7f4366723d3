//! Record construction and introspection.
//!
//! Constructors return an owned handle, or null on failure with the last
//! error set. Composite constructors take ownership of their child
//! handles even when they fail.

use crate::buffer::{read_c_str, DdBuffer, DdString};
use crate::error::{clear_last_error, fail, null_argument, set_last_error, DdResult};
use crate::types::{borrowed_handle, record_from_handle, record_into_handle, record_ref, take_records, DdRecord};
use ddbridge_record::{Record, RecordResult};
use std::ffi::c_char;

fn invalid_children() -> *mut DdRecord {
    set_last_error("null child handle");
    std::ptr::null_mut()
}

/// Creates a Bool record.
#[no_mangle]
pub extern "C" fn ddbridge_bool(value: bool) -> *mut DdRecord {
    record_into_handle(Record::bool(value))
}

/// Creates a signed 64-bit integer record.
#[no_mangle]
pub extern "C" fn ddbridge_i64(value: i64) -> *mut DdRecord {
    record_into_handle(Record::i64(value))
}

/// Creates an arbitrary precision integer from `len` big-endian two's
/// complement bytes.
///
/// # Safety
///
/// `bytes` must point to `len` readable bytes (or be null with `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn ddbridge_int(bytes: *const u8, len: usize) -> *mut DdRecord {
    clear_last_error();
    if len == 0 {
        return record_into_handle(Record::int(&[]));
    }
    if bytes.is_null() {
        null_argument();
        return std::ptr::null_mut();
    }
    record_into_handle(Record::int(std::slice::from_raw_parts(bytes, len)))
}

/// Creates a String record by copying a null-terminated UTF-8 string.
///
/// # Safety
///
/// `s` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_string(s: *const c_char) -> *mut DdRecord {
    clear_last_error();
    match read_c_str(s) {
        Some(Ok(s)) => record_into_handle(Record::string(s)),
        Some(Err(_)) => {
            set_last_error("invalid UTF-8 in string");
            std::ptr::null_mut()
        }
        None => {
            null_argument();
            std::ptr::null_mut()
        }
    }
}

/// Creates a Tuple, taking ownership of `len` field handles.
///
/// # Safety
///
/// `fields` must point to `len` owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_tuple(fields: *const *mut DdRecord, len: usize) -> *mut DdRecord {
    clear_last_error();
    match take_records(fields, len) {
        Some(fields) => record_into_handle(Record::tuple(fields)),
        None => invalid_children(),
    }
}

/// Creates a 2-tuple, taking ownership of both handles.
///
/// # Safety
///
/// `first` and `second` must be owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_pair(first: *mut DdRecord, second: *mut DdRecord) -> *mut DdRecord {
    let fields = [first, second];
    ddbridge_tuple(fields.as_ptr(), fields.len())
}

/// Creates a Vector, taking ownership of `len` element handles.
///
/// # Safety
///
/// `elems` must point to `len` owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_vector(elems: *const *mut DdRecord, len: usize) -> *mut DdRecord {
    clear_last_error();
    match take_records(elems, len) {
        Some(elems) => record_into_handle(Record::vector(elems)),
        None => invalid_children(),
    }
}

/// Creates a Set, taking ownership of `len` element handles. Elements are
/// sorted and duplicates dropped.
///
/// # Safety
///
/// `elems` must point to `len` owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_set(elems: *const *mut DdRecord, len: usize) -> *mut DdRecord {
    clear_last_error();
    match take_records(elems, len) {
        Some(elems) => record_into_handle(Record::set(elems)),
        None => invalid_children(),
    }
}

/// Creates a Map from `len` 2-tuple handles, taking ownership of them.
/// Entries are sorted by key; a repeated key keeps its last value.
///
/// # Safety
///
/// `pairs` must point to `len` owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_map(pairs: *const *mut DdRecord, len: usize) -> *mut DdRecord {
    clear_last_error();
    let Some(pairs) = take_records(pairs, len) else {
        return invalid_children();
    };
    match Record::map_from_pairs(pairs) {
        Ok(map) => record_into_handle(map),
        Err(e) => {
            fail(&e);
            std::ptr::null_mut()
        }
    }
}

/// Creates a Struct with the given constructor name, taking ownership of
/// `len` field handles.
///
/// # Safety
///
/// `constructor` must be a valid null-terminated string and `fields` must
/// point to `len` owned record handles.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_struct(
    constructor: *const c_char,
    fields: *const *mut DdRecord,
    len: usize,
) -> *mut DdRecord {
    clear_last_error();
    let fields = take_records(fields, len);
    let name = match read_c_str(constructor) {
        Some(Ok(name)) => name,
        Some(Err(_)) => {
            set_last_error("invalid UTF-8 in constructor name");
            return std::ptr::null_mut();
        }
        None => {
            null_argument();
            return std::ptr::null_mut();
        }
    };
    match fields {
        Some(fields) => record_into_handle(Record::structure(name, fields)),
        None => invalid_children(),
    }
}

/// Returns an owned deep copy of a record, or null.
///
/// # Safety
///
/// `record` must be null or a live record handle.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_clone_record(record: *const DdRecord) -> *mut DdRecord {
    if record.is_null() {
        return std::ptr::null_mut();
    }
    record_into_handle(record_ref(record).clone())
}

/// Frees an owned record handle. Null is ignored.
///
/// # Safety
///
/// `record` must be null or an owned handle not freed or consumed before.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_free_record(record: *mut DdRecord) {
    if !record.is_null() {
        drop(record_from_handle(record));
    }
}

macro_rules! predicate {
    ($(#[$doc:meta] $name:ident => $method:ident;)*) => {
        $(
            #[$doc]
            ///
            /// # Safety
            ///
            /// `record` must be null or a live record handle.
            #[no_mangle]
            pub unsafe extern "C" fn $name(record: *const DdRecord) -> bool {
                !record.is_null() && record_ref(record).$method()
            }
        )*
    };
}

predicate! {
    /// Returns true for Bool records.
    ddbridge_is_bool => is_bool;
    /// Returns true for signed 64-bit records.
    ddbridge_is_i64 => is_i64;
    /// Returns true for either integer variant.
    ddbridge_is_int => is_int;
    /// Returns true for String records.
    ddbridge_is_string => is_string;
    /// Returns true for Tuple records.
    ddbridge_is_tuple => is_tuple;
    /// Returns true for Vector records.
    ddbridge_is_vector => is_vector;
    /// Returns true for Set records.
    ddbridge_is_set => is_set;
    /// Returns true for Map records.
    ddbridge_is_map => is_map;
    /// Returns true for Struct records.
    ddbridge_is_struct => is_struct;
}

/// Runs `f` on a borrowed record and writes its result to `out`.
unsafe fn inspect<T>(
    record: *const DdRecord,
    out: *mut T,
    f: impl FnOnce(&Record) -> RecordResult<T>,
) -> DdResult {
    clear_last_error();
    if record.is_null() || out.is_null() {
        return null_argument();
    }
    match f(record_ref(record)) {
        Ok(value) => {
            out.write(value);
            DdResult::Ok
        }
        Err(e) => fail(&e),
    }
}

/// Reads a Bool record.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_bool(record: *const DdRecord, out: *mut bool) -> DdResult {
    inspect(record, out, Record::get_bool)
}

/// Reads an integer record that fits in 64 bits.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_i64(record: *const DdRecord, out: *mut i64) -> DdResult {
    inspect(record, out, Record::get_i64)
}

/// Copies an integer record's big-endian bytes into a new buffer.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable. Free the buffer with
/// `ddbridge_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_int(record: *const DdRecord, out: *mut DdBuffer) -> DdResult {
    inspect(record, out, |r| r.get_int().map(DdBuffer::from_vec))
}

/// Copies a String record into a new C string.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable. Free the string with
/// `ddbridge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_str(record: *const DdRecord, out: *mut DdString) -> DdResult {
    copy_string(record, out, Record::get_str)
}

/// Copies a Struct record's constructor name into a new C string.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable. Free the string with
/// `ddbridge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_get_constructor(
    record: *const DdRecord,
    out: *mut DdString,
) -> DdResult {
    copy_string(record, out, Record::constructor)
}

unsafe fn copy_string(
    record: *const DdRecord,
    out: *mut DdString,
    get: impl FnOnce(&Record) -> RecordResult<&str>,
) -> DdResult {
    let mut interior_nul = false;
    let result = inspect(record, out, |r| {
        get(r).map(|s| {
            DdString::from_str(s).unwrap_or_else(|| {
                interior_nul = true;
                DdString::empty()
            })
        })
    });
    if result.is_ok() && interior_nul {
        set_last_error("string contains an interior NUL byte");
        return DdResult::InvalidArgument;
    }
    result
}

/// Renders a record in its text form.
///
/// # Safety
///
/// `record` must be a live handle and `out` writable. Free the string with
/// `ddbridge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_record_to_string(
    record: *const DdRecord,
    out: *mut DdString,
) -> DdResult {
    clear_last_error();
    if record.is_null() || out.is_null() {
        return null_argument();
    }
    match DdString::from_str(&record_ref(record).to_string()) {
        Some(text) => {
            out.write(text);
            DdResult::Ok
        }
        None => {
            set_last_error("string contains an interior NUL byte");
            DdResult::InvalidArgument
        }
    }
}

macro_rules! size {
    ($(#[$doc:meta] $name:ident => $method:ident;)*) => {
        $(
            #[$doc]
            ///
            /// # Safety
            ///
            /// `record` must be a live handle and `out` writable.
            #[no_mangle]
            pub unsafe extern "C" fn $name(record: *const DdRecord, out: *mut usize) -> DdResult {
                inspect(record, out, Record::$method)
            }
        )*
    };
}

size! {
    /// Number of tuple fields.
    ddbridge_tuple_size => tuple_size;
    /// Number of vector elements.
    ddbridge_vector_size => vector_size;
    /// Number of set elements.
    ddbridge_set_size => set_size;
    /// Number of map entries.
    ddbridge_map_size => map_size;
    /// Number of struct fields.
    ddbridge_struct_size => struct_size;
}

macro_rules! indexed {
    ($(#[$doc:meta] $name:ident => $method:ident;)*) => {
        $(
            #[$doc]
            ///
            /// The handle written to `out` is borrowed from `record`.
            ///
            /// # Safety
            ///
            /// `record` must be a live handle and `out` writable.
            #[no_mangle]
            pub unsafe extern "C" fn $name(
                record: *const DdRecord,
                index: usize,
                out: *mut *const DdRecord,
            ) -> DdResult {
                inspect(record, out, |r| r.$method(index).map(borrowed_handle))
            }
        )*
    };
}

indexed! {
    /// Borrows a tuple field.
    ddbridge_tuple_field => tuple_field;
    /// Borrows a vector element.
    ddbridge_vector_elem => vector_elem;
    /// Borrows a set element.
    ddbridge_set_elem => set_elem;
    /// Borrows a map key.
    ddbridge_map_key => map_key;
    /// Borrows a map value.
    ddbridge_map_val => map_val;
    /// Borrows a struct field.
    ddbridge_struct_field => struct_field;
}

/// Looks up `key` in a Map record. The value handle written to `out` is
/// borrowed from `map`; `NotFound` is returned if the key is absent.
///
/// # Safety
///
/// `map` and `key` must be live handles and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_map_get(
    map: *const DdRecord,
    key: *const DdRecord,
    out: *mut *const DdRecord,
) -> DdResult {
    if key.is_null() {
        clear_last_error();
        return null_argument();
    }
    let key = record_ref(key);
    let result = inspect(map, out, |r| {
        r.map_get(key)
            .map(|v| v.map_or(std::ptr::null(), borrowed_handle))
    });
    if result.is_ok() && (*out).is_null() {
        set_last_error("key not found");
        return DdResult::NotFound;
    }
    result
}
