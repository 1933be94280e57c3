//! Component D: after a write, recomputes and rewrites affected hash blocks
//! for each IVFC level from 4 down to 1, then writes the outer partition
//! hash. Levels are numbered 1..=4 for IVFC data levels; level 0 is the
//! synthetic outer partition hash.

use crate::descriptor::Descriptor;
use crate::dpfs_io;
use crate::error::*;
use crate::misc::ceildiv;
use crate::random_access_file::RandomAccessFile;
use sha2::*;

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.input(data);
    let digest = hasher.result();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Recomputes the hashes covering `[offset, offset+size)` at `level` and
/// writes them into the parent (level - 1, or the DIFI master-hash region
/// for level 1). Returns the `(offset, size)` range to propagate to the
/// next level up, or `None` when there is no next level (level 0, and level
/// 1 whose output lands in the master hash instead of a level).
pub fn fix_level(
    file: &dyn RandomAccessFile,
    desc: &Descriptor,
    cache: &[u8],
    level: u32,
    offset: usize,
    size: usize,
) -> Result<Option<(usize, usize)>, Error> {
    if level == 0 {
        let mut table = vec![0u8; desc.size_table];
        file.read(desc.offset_table, &mut table)?;
        let hash = sha256(&table);
        file.write(desc.offset_partition_hash, &hash)?;
        return Ok(None);
    }
    if level > 4 {
        return make_error(Error::BadSize);
    }

    let idx = (level - 1) as usize;
    let block_size = 1usize << desc.log_ivfc_lvl[idx];
    let align_offset = (offset / block_size) * block_size;
    let align_size = size + offset - align_offset;
    let size_lvl = desc.size_ivfc_lvl[idx];

    let next = if level != 1 {
        Some((
            (align_offset / block_size) * 32,
            ceildiv(align_size, block_size) * 32,
        ))
    } else {
        None
    };

    let mut cur_offset = align_offset;
    let mut remaining = align_size;
    while remaining > 0 {
        let mut buf = vec![0u8; block_size];
        let read_len = if cur_offset >= size_lvl {
            0
        } else {
            block_size.min(size_lvl - cur_offset)
        };

        if level == 4 && desc.ivfc_use_extlvl4 {
            file.read(
                desc.offset_ivfc_lvl[idx] + cur_offset,
                &mut buf[..read_len],
            )?;
        } else {
            let got = dpfs_io::read_lvl3(
                file,
                desc,
                cache,
                desc.offset_ivfc_lvl[idx] + cur_offset,
                &mut buf[..read_len],
            );
            if got != read_len {
                return make_error(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "short read while hashing IVFC level",
                )));
            }
        }

        let hash = sha256(&buf);

        if level == 1 {
            let pos = desc.offset_difi + desc.offset_master_hash + (cur_offset / block_size) * 32;
            file.write(pos, &hash)?;
        } else {
            let parent_pos =
                desc.offset_ivfc_lvl[idx - 1] + (cur_offset / block_size) * 32;
            let wrote = dpfs_io::write_lvl3(file, desc, cache, parent_pos, &hash);
            if wrote != 32 {
                return make_error(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "short write while storing IVFC parent hash",
                )));
            }
        }

        cur_offset += block_size;
        remaining = remaining.saturating_sub(block_size);
    }

    Ok(next)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory_file::MemoryFile;

    #[test]
    fn level0_hashes_active_table_into_partition_hash_slot() {
        let mut data = vec![0u8; 0x200];
        for (i, b) in data[0..0x100].iter_mut().enumerate() {
            *b = i as u8;
        }
        let file = MemoryFile::new(data);
        let desc = Descriptor {
            offset_table: 0,
            size_table: 0x100,
            offset_difi: 0,
            offset_partition_hash: 0x180,
            offset_dpfs_lvl1: 0,
            offset_dpfs_lvl2: 0,
            offset_dpfs_lvl3: 0,
            size_dpfs_lvl1: 0,
            size_dpfs_lvl2: 0,
            size_dpfs_lvl3: 0,
            log_dpfs_lvl2: 2,
            log_dpfs_lvl3: 2,
            dpfs_lvl1_selector: 0,
            offset_ivfc_lvl: [0; 4],
            size_ivfc_lvl: [0; 4],
            log_ivfc_lvl: [0; 4],
            offset_master_hash: 0,
            ivfc_use_extlvl4: false,
        };
        let next = fix_level(&file, &desc, &[], 0, 0, 0).unwrap();
        assert!(next.is_none());
        let mut table = vec![0u8; 0x100];
        file.read(0, &mut table).unwrap();
        let mut stored = [0u8; 32];
        file.read(0x180, &mut stored).unwrap();
        assert_eq!(stored, sha256(&table));
    }

    #[test]
    fn unaligned_range_covers_exactly_its_blocks() {
        // block_size=16, write at offset 5 size 17 -> covers blocks [0,32), next_size=2*32=64.
        let block_log = 4u32;
        let block_size = 1usize << block_log;
        let size_lvl = block_size * 4;
        let desc = Descriptor {
            offset_table: 0,
            size_table: 0,
            offset_difi: 0,
            offset_partition_hash: 0,
            offset_dpfs_lvl1: 0,
            offset_dpfs_lvl2: 0,
            offset_dpfs_lvl3: 0,
            size_dpfs_lvl1: 0,
            size_dpfs_lvl2: 0,
            size_dpfs_lvl3: 4096,
            log_dpfs_lvl2: 2,
            log_dpfs_lvl3: 12,
            dpfs_lvl1_selector: 0,
            offset_ivfc_lvl: [0, 0x1000, 0, 0],
            size_ivfc_lvl: [0, size_lvl, 0, 0],
            log_ivfc_lvl: [0, block_log, 0, 0],
            offset_master_hash: 0,
            ivfc_use_extlvl4: false,
        };
        let data = vec![0u8; 4096 + 0x1000];
        let file = MemoryFile::new(data);
        // cache all-zero -> everything routed to copy 0, dpfs level 3 region starts at 0.
        let cache = [0u8; 4];
        let (next_offset, next_size) = fix_level(&file, &desc, &cache, 2, 5, 17).unwrap().unwrap();
        assert_eq!(next_offset, 0);
        assert_eq!(next_size, 2 * 32);
    }
}
