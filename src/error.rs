//! # Error handling

use failure_derive::Fail;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Message(String),

    #[fail(display = "sqlite error: {}", _0)]
    Sqlite(#[cause] rusqlite::Error),

    #[fail(display = "pool error: {}", _0)]
    Pool(#[cause] r2d2::Error),

    #[fail(display = "io error: {}", _0)]
    Io(#[cause] std::io::Error),

    #[fail(display = "invalid file-info encoding")]
    InvalidFileInfo,

    #[fail(display = "json error: {}", _0)]
    Json(#[cause] serde_json::Error),

    #[fail(display = "profile directory already locked: only one session per confdir")]
    AlreadyLocked,

    #[fail(display = "profile dir version mismatch: expected {}, found {}", expected, found)]
    VersionMismatch { expected: u32, found: u32 },

    #[fail(display = "no such profile: {}", _0)]
    UnknownProfile(String),

    #[fail(display = "feature not supported: {:?}", _0)]
    NotSupported(crate::adapter::Feature),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        Error::Sqlite(err)
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Error {
        Error::Pool(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::error::Error::Message($e.to_string()));
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::Error::Message(format!($fmt, $($arg)+)));
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::error::Error::Message($e.to_string())
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::error::Error::Message(format!($fmt, $($arg)+))
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            bail!($fmt, $($arg)+);
        }
    };
}
