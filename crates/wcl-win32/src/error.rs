use std::cell::Cell;

use thiserror::Error;

/// Mirrors the `GetLastError` codes the stubs actually need (spec.md §7),
/// not the full Win32 error space.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Win32Error {
    #[error("ERROR_INVALID_HANDLE")]
    InvalidHandle,
    #[error("ERROR_CLASS_DOES_NOT_EXIST")]
    ClassDoesNotExist,
    #[error("ERROR_CLASS_ALREADY_EXISTS")]
    ClassAlreadyExists,
    #[error("ERROR_FILE_NOT_FOUND")]
    FileNotFound,
    #[error("ERROR_NOT_ENOUGH_MEMORY")]
    NotEnoughMemory,
    #[error("ERROR_INVALID_PARAMETER")]
    InvalidParameter,
}

impl Win32Error {
    /// The numeric code a real `GetLastError` would return.
    pub fn code(self) -> u32 {
        match self {
            Win32Error::InvalidHandle => 6,
            Win32Error::ClassDoesNotExist => 1411,
            Win32Error::ClassAlreadyExists => 1410,
            Win32Error::FileNotFound => 2,
            Win32Error::NotEnoughMemory => 8,
            Win32Error::InvalidParameter => 87,
        }
    }
}

thread_local! {
    static LAST_ERROR: Cell<u32> = Cell::new(0);
}

/// Backs `kernel32::GetLastError`/`SetLastError`; per-thread, matching
/// the real API.
pub fn set_last_error(err: Win32Error) {
    LAST_ERROR.with(|c| c.set(err.code()));
}

pub fn set_raw_last_error(code: u32) {
    LAST_ERROR.with(|c| c.set(code));
}

pub fn last_error_code() -> u32 {
    LAST_ERROR.with(|c| c.get())
}
