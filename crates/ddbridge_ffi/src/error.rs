//! Result codes and the thread-local last error.

use ddbridge_core::CoreError;
use ddbridge_record::RecordError;
use std::cell::RefCell;
use std::ffi::{c_char, CString};

/// Result code for FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdResult {
    /// Operation succeeded.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Invalid argument (including invalid UTF-8).
    InvalidArgument = 2,
    /// Null pointer.
    NullPointer = 3,
    /// The record has a different variant.
    TypeMismatch = 4,
    /// Index outside `[0, size)`.
    IndexOutOfRange = 5,
    /// Keyed lookup found nothing.
    NotFound = 6,
    /// Encoding failure.
    EncodingError = 7,
    /// Call out of order with the transaction state.
    InvalidState = 8,
    /// The engine was started without the feature the call needs.
    FeatureDisabled = 9,
}

impl DdResult {
    /// Returns true if the result indicates success.
    pub fn is_ok(self) -> bool {
        self == DdResult::Ok
    }

    /// Returns true if the result indicates an error.
    pub fn is_err(self) -> bool {
        self != DdResult::Ok
    }
}

impl From<&RecordError> for DdResult {
    fn from(err: &RecordError) -> Self {
        match err {
            RecordError::TypeMismatch { .. } | RecordError::NotAPair { .. } => {
                DdResult::TypeMismatch
            }
            RecordError::IndexOutOfRange { .. } => DdResult::IndexOutOfRange,
        }
    }
}

impl From<&CoreError> for DdResult {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Record(e) => e.into(),
            CoreError::Encoding { .. } => DdResult::EncodingError,
            CoreError::UnknownTable { .. } => DdResult::NotFound,
            CoreError::InvalidState { .. } => DdResult::InvalidState,
            CoreError::FeatureDisabled { .. } => DdResult::FeatureDisabled,
            _ => DdResult::Error,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Sets the last error message.
pub fn set_last_error(message: impl Into<String>) {
    let msg = message.into();
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clears the last error.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Records `err` as the last error and returns its code.
pub(crate) fn fail<E>(err: &E) -> DdResult
where
    E: std::fmt::Display,
    for<'a> DdResult: From<&'a E>,
{
    set_last_error(err.to_string());
    DdResult::from(err)
}

/// Records a null-pointer failure.
pub(crate) fn null_argument() -> DdResult {
    set_last_error("null pointer argument");
    DdResult::NullPointer
}

/// Returns the last error message, or null if none is set.
///
/// The pointer stays valid until the next FFI call on this thread.
#[no_mangle]
pub extern "C" fn ddbridge_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Clears the last error message.
#[no_mangle]
pub extern "C" fn ddbridge_clear_error() {
    clear_last_error();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddbridge_record::RecordKind;

    #[test]
    fn result_codes() {
        assert_eq!(DdResult::Ok as i32, 0);
        assert_eq!(DdResult::TypeMismatch as i32, 4);
        assert!(DdResult::Ok.is_ok());
        assert!(DdResult::NullPointer.is_err());
    }

    #[test]
    fn record_errors_map() {
        let mismatch = RecordError::type_mismatch(RecordKind::Bool, RecordKind::I64);
        assert_eq!(DdResult::from(&mismatch), DdResult::TypeMismatch);
        let range = RecordError::index_out_of_range(3, 2);
        assert_eq!(DdResult::from(&range), DdResult::IndexOutOfRange);
        let core = CoreError::from(range);
        assert_eq!(DdResult::from(&core), DdResult::IndexOutOfRange);
        assert_eq!(DdResult::from(&CoreError::encoding("bad")), DdResult::EncodingError);
        assert_eq!(DdResult::from(&CoreError::unknown_table("Nope")), DdResult::NotFound);
        assert_eq!(
            DdResult::from(&CoreError::invalid_state("transaction_commit", "idle")),
            DdResult::InvalidState
        );
        assert_eq!(DdResult::from(&CoreError::engine("boom")), DdResult::Error);
    }

    #[test]
    fn last_error() {
        clear_last_error();
        assert!(ddbridge_get_last_error().is_null());

        let code = fail(&RecordError::index_out_of_range(5, 1));
        assert_eq!(code, DdResult::IndexOutOfRange);
        let ptr = ddbridge_get_last_error();
        assert!(!ptr.is_null());

        // Safety: just set on this thread
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        assert!(msg.to_str().unwrap().contains('5'));

        ddbridge_clear_error();
        assert!(ddbridge_get_last_error().is_null());
    }
}
