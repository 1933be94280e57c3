//! Ties components A-D together into the session-owned resource spec.md
//! §9 asks for: an immutable [`Descriptor`] plus the `Vec<u8>` level-2
//! cache it was built against, with no file handle kept alive between
//! calls (reopening is cheap and avoids hidden global state, per §5).

use crate::descriptor::Descriptor;
use crate::disk_file::{open_ro, open_rw};
use crate::dpfs_cache;
use crate::dpfs_io;
use crate::error::*;
use crate::ivfc_fix;
use crate::random_access_file::RandomAccessFile;
use std::path::Path;

pub struct Session {
    pub descriptor: Descriptor,
    pub lvl2_cache: Vec<u8>,
}

impl Session {
    /// Parses the descriptor and builds the level-2 cache in one shot.
    pub fn open(path: &Path, want_partition_b: bool) -> Result<Session, Error> {
        let descriptor = Descriptor::parse(path, want_partition_b)?;
        let mut cache = vec![0u8; descriptor.size_dpfs_lvl2];
        let file = open_ro(path)?;
        dpfs_cache::build_lvl2_cache(&file, &descriptor, &mut cache)?;
        Ok(Session {
            descriptor,
            lvl2_cache: cache,
        })
    }

    /// Reads `buf.len()` bytes at `offset` inside IVFC level 4. Past the
    /// end of level 4 the request is silently clamped, matching the
    /// original firmware's read-clamps/write-rejects asymmetry.
    pub fn read_lvl4(&self, path: &Path, offset: usize, buf: &mut [u8]) -> usize {
        let desc = &self.descriptor;
        if offset > desc.size_ivfc_lvl[3] {
            return 0;
        }
        let size = buf.len().min(desc.size_ivfc_lvl[3] - offset);
        let buf = &mut buf[..size];

        let file = match open_ro(path) {
            Ok(f) => f,
            Err(_) => return 0,
        };

        if desc.ivfc_use_extlvl4 {
            match file.read(desc.offset_ivfc_lvl[3] + offset, buf) {
                Ok(()) => size,
                Err(_) => 0,
            }
        } else {
            dpfs_io::read_lvl3(
                &file,
                desc,
                &self.lvl2_cache,
                desc.offset_ivfc_lvl[3] + offset,
                buf,
            )
        }
    }

    /// Writes `buf` at `offset` inside IVFC level 4, then fixes the whole
    /// hash chain (levels 4..0) bottom-up. Rejects (returns `0`) a write
    /// that would extend past `size_ivfc_lvl4` instead of clamping.
    pub fn write_lvl4(&self, path: &Path, offset: usize, buf: &[u8]) -> usize {
        let desc = &self.descriptor;
        if offset + buf.len() > desc.size_ivfc_lvl[3] {
            return 0;
        }

        let file = match open_rw(path) {
            Ok(f) => f,
            Err(_) => return 0,
        };

        let written = if desc.ivfc_use_extlvl4 {
            match file.write(desc.offset_ivfc_lvl[3] + offset, buf) {
                Ok(()) => buf.len(),
                Err(_) => 0,
            }
        } else {
            dpfs_io::write_lvl3(
                &file,
                desc,
                &self.lvl2_cache,
                desc.offset_ivfc_lvl[3] + offset,
                buf,
            )
        };
        if written == 0 {
            return 0;
        }

        let mut cur_offset = offset;
        let mut cur_size = written;
        for level in (0..=4u32).rev() {
            match ivfc_fix::fix_level(&file, desc, &self.lvl2_cache, level, cur_offset, cur_size) {
                Ok(Some((next_offset, next_size))) => {
                    cur_offset = next_offset;
                    cur_size = next_size;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("hash chain fix failed at level {}: {}", level, e);
                    return 0;
                }
            }
        }

        written
    }

    /// Recomputes the outer partition hash without touching IVFC/DPFS, for
    /// callers that batched several writes and only need the outer digest
    /// refreshed once at the end.
    pub fn fix_partition_hash(&self, path: &Path) -> Result<(), Error> {
        let file = open_rw(path)?;
        ivfc_fix::fix_level(&file, &self.descriptor, &self.lvl2_cache, 0, 0, 0)?;
        Ok(())
    }
}
