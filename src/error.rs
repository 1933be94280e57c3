/// Rich internal error type.
///
/// Every public byte-count-returning operation (`read_ivfc_lvl4`,
/// `write_ivfc_lvl4`) still collapses any `Err` to `0` bytes transferred, a
/// single opaque failure indicator. The variants below exist so tests and
/// logs can tell *why* without changing that external contract.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    BadMagic,
    BadVersion,
    BadSize,
    BadOffset,
    CacheTooSmall,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::BadMagic => write!(f, "unexpected magic value"),
            Error::BadVersion => write!(f, "unexpected version value"),
            Error::BadSize => write!(f, "descriptor size/offset invariant violated"),
            Error::BadOffset => write!(f, "offset out of bound"),
            Error::CacheTooSmall => write!(f, "level-2 cache buffer too small"),
        }
    }
}

impl std::error::Error for Error {}

pub(crate) fn make_error<T>(e: Error) -> Result<T, Error> {
    Err(e)
}
