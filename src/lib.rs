//! Reader/writer for the DISA and DIFF save-data/extdata containers.
//!
//! A DISA/DIFF container wraps an inner partition built from two layers:
//! a DPFS atomic-update structure (two physical copies of two lower levels
//! plus a selector bitmap) and an IVFC hash tree rooted in a master hash.
//! This crate exposes the innermost payload, IVFC level 4, as a
//! byte-addressable region, maintaining every DPFS/IVFC invariant a host
//! firmware will later re-verify.
//!
//! Not in scope: outer signature/CMAC computation, concurrent access,
//! at-rest encryption, interpreting the bytes inside level 4 (that is a
//! filesystem, handled by a different layer), and container creation —
//! this crate only ever parses and services a container that already
//! exists.

pub mod bitmap;
pub mod descriptor;
pub mod disk_file;
pub mod dpfs_cache;
pub mod dpfs_io;
pub mod error;
pub mod ivfc_fix;
pub mod memory_file;
pub mod misc;
pub mod random_access_file;
pub mod session;

pub use descriptor::Descriptor;
pub use error::Error;
pub use session::Session;

use std::path::Path;

/// `A`: parses the outer header and nested descriptors into a flat,
/// read-only [`Descriptor`].
pub fn get_rw_info(path: &Path, want_partition_b: bool) -> Result<Descriptor, Error> {
    Descriptor::parse(path, want_partition_b)
}

/// `B`: builds the effective DPFS level-2 cache for `desc` into `buf`.
/// `buf` must be at least [`dpfs_cache::min_cache_len`] bytes.
pub fn build_dpfs_lvl2_cache(path: &Path, desc: &Descriptor, buf: &mut [u8]) -> Result<(), Error> {
    let file = disk_file::open_ro(path)?;
    dpfs_cache::build_lvl2_cache(&file, desc, buf)
}

/// `C`+top-level: reads `out.len()` bytes at `offset` inside IVFC level 4.
/// When `session` is `None`, parses a descriptor and builds a transient
/// cache for the duration of this call. Returns the number of bytes
/// transferred, `0` on any failure.
pub fn read_ivfc_lvl4(path: &Path, session: Option<&Session>, offset: usize, out: &mut [u8]) -> usize {
    match session {
        Some(s) => s.read_lvl4(path, offset, out),
        None => match Session::open(path, false) {
            Ok(s) => s.read_lvl4(path, offset, out),
            Err(_) => 0,
        },
    }
}

/// `C`+`D`+top-level: writes `data` at `offset` inside IVFC level 4, then
/// fixes all affected hash levels bottom-up (4, 3, 2, 1, 0). Returns the
/// number of bytes transferred, `0` on any failure, including a write that
/// would extend past the current size of level 4 (no such extension is
/// ever performed).
pub fn write_ivfc_lvl4(path: &Path, session: Option<&Session>, offset: usize, data: &[u8]) -> usize {
    match session {
        Some(s) => s.write_lvl4(path, offset, data),
        None => match Session::open(path, false) {
            Ok(s) => s.write_lvl4(path, offset, data),
            Err(_) => 0,
        },
    }
}

/// `D` (level 0 only): recomputes SHA-256 over the active descriptor table
/// and rewrites the outer partition hash, without touching IVFC/DPFS.
/// Exposed so mount-time flushers can fix the outer digest once after a
/// batch of `write_ivfc_lvl4` calls instead of re-running the full chain.
pub fn fix_partition_hash(path: &Path, desc: &Descriptor) -> Result<(), Error> {
    let file = disk_file::open_rw(path)?;
    ivfc_fix::fix_level(&file, desc, &[], 0, 0, 0)?;
    Ok(())
}
