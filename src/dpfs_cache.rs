//! Component B: materializes the effective DPFS level-2 bitmap by combining
//! the two on-disk copies of level-2 under control of the level-1
//! bit-selector (one bit per level-2 *block*, not per level-3 block).

use crate::bitmap;
use crate::descriptor::Descriptor;
use crate::error::*;
use crate::misc::ceildiv;
use crate::random_access_file::RandomAccessFile;

/// Minimum cache length in bytes: enough bits to cover every level-3 block,
/// rounded up to a whole 32-bit word.
pub fn min_cache_len(desc: &Descriptor) -> usize {
    let min_bits = ceildiv(desc.size_dpfs_lvl3, 1 << desc.log_dpfs_lvl3);
    ceildiv(min_bits, 32) * 4
}

/// Builds the effective level-2 cache into `buf`, which must be at least
/// [`min_cache_len`] bytes. On success `buf[..min_cache_len(desc)]` holds the
/// merged bitmap; bytes beyond that are left untouched.
pub fn build_lvl2_cache(
    file: &dyn RandomAccessFile,
    desc: &Descriptor,
    buf: &mut [u8],
) -> Result<(), Error> {
    let min_bytes = min_cache_len(desc);
    if buf.len() < min_bytes {
        return make_error(Error::CacheTooSmall);
    }
    if min_bytes > desc.size_dpfs_lvl2 {
        log::error!("DPFS level-2 too small to hold the level-3 selector bitmap");
        return make_error(Error::BadSize);
    }
    if min_bytes > desc.size_dpfs_lvl1 << (3 + desc.log_dpfs_lvl2) {
        log::error!("DPFS level-1 cannot address enough level-2 bits");
        return make_error(Error::BadSize);
    }

    // level-1 is read into a word-aligned scratch buffer so bitmap::get_bit
    // never reads past it.
    let lvl1_len = (desc.size_dpfs_lvl1 + 3) / 4 * 4;
    let mut lvl1 = vec![0u8; lvl1_len];
    let offset_lvl1 = desc.offset_dpfs_lvl1
        + if desc.dpfs_lvl1_selector != 0 {
            desc.size_dpfs_lvl1
        } else {
            0
        };
    file.read(offset_lvl1, &mut lvl1[..desc.size_dpfs_lvl1])?;

    // copy 0 is the default content of every block.
    file.read(desc.offset_dpfs_lvl2, &mut buf[..min_bytes])?;

    let block_len = 1usize << desc.log_dpfs_lvl2;
    let offset_lvl2_1 = desc.offset_dpfs_lvl2 + desc.size_dpfs_lvl2;
    let mut bit_index = 0usize;
    while (bit_index << desc.log_dpfs_lvl2) < min_bytes {
        if bitmap::get_bit(&lvl1, bit_index) != 0 {
            let block_offset = bit_index << desc.log_dpfs_lvl2;
            file.read(
                offset_lvl2_1 + block_offset,
                &mut buf[block_offset..block_offset + block_len],
            )?;
        }
        bit_index += 1;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory_file::MemoryFile;

    // log_lvl3 = 9 (512-byte blocks), size_lvl3 = 0x10000 -> 128 lvl3 blocks
    // -> 128 bits -> 16 bytes of cache (already word-aligned).
    // log_lvl2 = 3 -> each lvl1 bit selects an 8-byte chunk of that cache,
    // so 16 bytes of cache needs exactly 2 lvl1 bits.
    fn desc() -> Descriptor {
        Descriptor {
            offset_table: 0,
            size_table: 0,
            offset_difi: 0,
            offset_partition_hash: 0,
            offset_dpfs_lvl1: 0,
            offset_dpfs_lvl2: 4,
            offset_dpfs_lvl3: 4 + 32,
            size_dpfs_lvl1: 4,
            size_dpfs_lvl2: 16,
            size_dpfs_lvl3: 0x10000,
            log_dpfs_lvl2: 3,
            log_dpfs_lvl3: 9,
            dpfs_lvl1_selector: 0,
            offset_ivfc_lvl: [0; 4],
            size_ivfc_lvl: [0; 4],
            log_ivfc_lvl: [0; 4],
            offset_master_hash: 0,
            ivfc_use_extlvl4: false,
        }
    }

    #[test]
    fn min_cache_len_rounds_to_word() {
        assert_eq!(min_cache_len(&desc()), 16);
    }

    #[test]
    fn cherry_picks_lvl2_copy1_per_lvl1_bit() {
        let desc = desc();
        // file layout: lvl1 (4B) | lvl2 copy0 (16B) | lvl2 copy1 (16B) | lvl3 (2 * 0x10000B)
        let mut data = vec![0u8; 4 + 16 + 16 + 2 * 0x10000];
        // lvl1 word's most-significant byte (last in little-endian storage
        // order) = 0x80: MSB-first bit 0 set, bit 1 clear.
        data[3] = 0x80;
        for b in &mut data[4..4 + 16] {
            *b = 0x11; // copy 0 fill pattern
        }
        for b in &mut data[4 + 16..4 + 32] {
            *b = 0xFF; // copy 1 fill pattern
        }
        let file = MemoryFile::new(data);
        let mut cache = vec![0u8; min_cache_len(&desc)];
        build_lvl2_cache(&file, &desc, &mut cache).unwrap();
        // bit 0 set -> first 8-byte chunk comes from copy 1.
        assert_eq!(&cache[0..8], &[0xFFu8; 8][..]);
        // bit 1 clear -> second 8-byte chunk stays copy 0.
        assert_eq!(&cache[8..16], &[0x11u8; 8][..]);
    }

    #[test]
    fn rejects_undersized_buffer() {
        let desc = desc();
        let mut cache = vec![0u8; 1];
        assert!(build_lvl2_cache(&MemoryFile::new(vec![0u8; 256]), &desc, &mut cache).is_err());
    }
}
