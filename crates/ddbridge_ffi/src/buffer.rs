//! Owned byte buffers and strings handed to C.

use std::ffi::{c_char, CStr, CString};

/// A byte buffer owned by Rust. Release it with `ddbridge_free_buffer`.
#[repr(C)]
#[derive(Debug)]
pub struct DdBuffer {
    /// Pointer to data.
    pub data: *mut u8,
    /// Length in bytes.
    pub len: usize,
    /// Capacity (for internal use).
    pub capacity: usize,
}

impl DdBuffer {
    /// Creates a buffer from a Vec.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let mut vec = vec.into_boxed_slice();
        let data = vec.as_mut_ptr();
        let len = vec.len();
        std::mem::forget(vec);

        Self {
            data,
            len,
            capacity: len,
        }
    }

    /// Creates an empty buffer.
    pub fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Returns true if the buffer is null.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Converts back to a Vec, consuming the buffer.
    ///
    /// # Safety
    ///
    /// The buffer must have been created by [`DdBuffer::from_vec`].
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.data.is_null() {
            return Vec::new();
        }
        Vec::from_raw_parts(self.data, self.len, self.capacity)
    }
}

/// Frees a buffer returned by ddbridge.
///
/// # Safety
///
/// The buffer must come from a ddbridge function and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_free_buffer(buffer: DdBuffer) {
    drop(buffer.into_vec());
}

/// A null-terminated UTF-8 string owned by Rust. Release it with
/// `ddbridge_free_string`.
#[repr(C)]
#[derive(Debug)]
pub struct DdString {
    /// Pointer to the null-terminated string.
    pub ptr: *mut c_char,
    /// Length, not counting the terminator.
    pub len: usize,
}

impl DdString {
    /// Copies a Rust string. Fails if it contains an interior NUL.
    pub fn from_str(s: &str) -> Option<Self> {
        let cstring = CString::new(s).ok()?;
        let len = cstring.as_bytes().len();
        Some(Self {
            ptr: cstring.into_raw(),
            len,
        })
    }

    /// Creates a null string.
    pub fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Returns true if the string is null.
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Borrows the string.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live string from [`DdString::from_str`].
    pub unsafe fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        CStr::from_ptr(self.ptr).to_str().ok()
    }
}

/// Frees a string returned by ddbridge.
///
/// # Safety
///
/// The string must come from a ddbridge function and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_free_string(string: DdString) {
    if !string.ptr.is_null() {
        drop(CString::from_raw(string.ptr));
    }
}

/// Reads a borrowed C string argument.
///
/// # Safety
///
/// `ptr` must be null or a valid null-terminated string.
pub(crate) unsafe fn read_c_str<'a>(ptr: *const c_char) -> Option<Result<&'a str, std::str::Utf8Error>> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_round_trip() {
        let buffer = DdBuffer::from_vec(vec![1, 2, 3]);
        assert!(!buffer.is_null());
        assert_eq!(buffer.len, 3);

        // Safety: created above
        let back = unsafe { buffer.into_vec() };
        assert_eq!(back, vec![1, 2, 3]);

        // Safety: freeing a null buffer is a no-op
        unsafe { ddbridge_free_buffer(DdBuffer::empty()) };
    }

    #[test]
    fn strings() {
        let string = DdString::from_str("Pair").unwrap();
        assert_eq!(string.len, 4);
        // Safety: created above
        assert_eq!(unsafe { string.as_str() }, Some("Pair"));
        unsafe { ddbridge_free_string(string) };

        assert!(DdString::empty().is_null());
        assert!(DdString::from_str("a\0b").is_none());
    }

    #[test]
    fn c_str_arguments() {
        let owned = CString::new("Edge").unwrap();
        // Safety: valid for the duration of the test
        assert_eq!(unsafe { read_c_str(owned.as_ptr()) }, Some(Ok("Edge")));
        assert!(unsafe { read_c_str(std::ptr::null()) }.is_none());

        let bad = [0xFFu8, 0x00];
        let result = unsafe { read_c_str(bad.as_ptr().cast()) };
        assert!(matches!(result, Some(Err(_))));
    }
}
