//! Parses the outer DISA/DIFF header and the nested DIFI/IVFC/DPFS
//! descriptors into a flat, read-only [`Descriptor`] used by every other
//! module in this crate.

use crate::disk_file::open_ro;
use crate::error::*;
use crate::random_access_file::{read_struct, RandomAccessFile};
use byte_struct::*;

const DIFI_HEADER_LEN: usize = 0x44;
const IVFC_DESC_LEN: usize = 0x78;
const DPFS_DESC_LEN: usize = 0x50;
const HASH_MIN_LEN: usize = 0x20;

#[derive(ByteStruct)]
#[byte_struct_le]
struct DisaHeader {
    magic: [u8; 4],
    version: u32,
    n_partitions: u32,
    _padding0: u32,
    offset_table1: u64,
    offset_table0: u64,
    size_table: u64,
    offset_desc_a: u64,
    size_desc_a: u64,
    offset_desc_b: u64,
    size_desc_b: u64,
    offset_partition_a: u64,
    size_partition_a: u64,
    offset_partition_b: u64,
    size_partition_b: u64,
    active_table: u8,
    _padding1: [u8; 3],
    hash_table: [u8; 0x20],
    _unused: [u8; 0x74],
}

#[derive(ByteStruct)]
#[byte_struct_le]
struct DiffHeader {
    magic: [u8; 4],
    version: u32,
    offset_table1: u64,
    offset_table0: u64,
    size_table: u64,
    offset_partition: u64,
    size_partition: u64,
    active_table: u8,
    _padding: [u8; 3],
    sha: [u8; 0x20],
    unique_id: u64,
}

#[derive(ByteStruct)]
#[byte_struct_le]
struct DifiHeader {
    magic: [u8; 4],
    version: u32,
    offset_ivfc: u64,
    size_ivfc: u64,
    offset_dpfs: u64,
    size_dpfs: u64,
    offset_hash: u64,
    size_hash: u64,
    ivfc_use_extlvl4: u8,
    dpfs_lvl1_selector: u8,
    _padding: u16,
    ivfc_offset_extlvl4: u64,
}

#[derive(ByteStruct)]
#[byte_struct_le]
struct IvfcDescriptor {
    magic: [u8; 4],
    version: u32,
    size_hash: u64,
    offset_lvl1: u64,
    size_lvl1: u64,
    log_lvl1: u32,
    _padding1: u32,
    offset_lvl2: u64,
    size_lvl2: u64,
    log_lvl2: u32,
    _padding2: u32,
    offset_lvl3: u64,
    size_lvl3: u64,
    log_lvl3: u32,
    _padding3: u32,
    offset_lvl4: u64,
    size_lvl4: u64,
    log_lvl4: u32,
    _padding4: u32,
    ivfc_descriptor_size: u64,
}

#[derive(ByteStruct)]
#[byte_struct_le]
struct DpfsDescriptor {
    magic: [u8; 4],
    version: u32,
    offset_lvl1: u64,
    size_lvl1: u64,
    log_lvl1: u32,
    _padding1: u32,
    offset_lvl2: u64,
    size_lvl2: u64,
    log_lvl2: u32,
    _padding2: u32,
    offset_lvl3: u64,
    size_lvl3: u64,
    log_lvl3: u32,
    _padding3: u32,
}

/// Flat, read-only record produced once per open. Every offset is absolute
/// (relative to the outer container file) except `offset_ivfc_lvl[0..=2]`
/// (levels 1-3) and, when `ivfc_use_extlvl4` is clear, `offset_ivfc_lvl[3]`
/// (level 4): those are relative to the start of the DPFS level-3 region,
/// i.e. the coordinate space [`crate::dpfs_io`] operates in. When
/// `ivfc_use_extlvl4` is set, `offset_ivfc_lvl[3]` is already absolute.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub offset_table: usize,
    pub size_table: usize,
    pub offset_difi: usize,
    pub offset_partition_hash: usize,

    pub offset_dpfs_lvl1: usize,
    pub offset_dpfs_lvl2: usize,
    pub offset_dpfs_lvl3: usize,
    pub size_dpfs_lvl1: usize,
    pub size_dpfs_lvl2: usize,
    pub size_dpfs_lvl3: usize,
    pub log_dpfs_lvl2: u32,
    pub log_dpfs_lvl3: u32,
    pub dpfs_lvl1_selector: u8,

    pub offset_ivfc_lvl: [usize; 4],
    pub size_ivfc_lvl: [usize; 4],
    pub log_ivfc_lvl: [u32; 4],
    pub offset_master_hash: usize,
    pub ivfc_use_extlvl4: bool,
}

impl Descriptor {
    /// Reads the outer header, selects the active descriptor table,
    /// validates and flattens the nested DIFI/IVFC/DPFS descriptors. Any
    /// failure returns a rich [`Error`]; callers that only care about
    /// success/failure can treat it as opaque.
    pub fn parse(path: &std::path::Path, want_partition_b: bool) -> Result<Descriptor, Error> {
        let file = open_ro(path)?;
        let file_size = file.len();

        let mut magic = [0u8; 4];
        file.read(0x100, &mut magic)?;

        let offset_partition;
        let size_partition;
        let offset_difi;
        let offset_table;
        let size_table;
        let offset_partition_hash;

        if magic == *b"DISA" {
            let h: DisaHeader = read_struct(&file, 0x100)?;
            if h.version != 0x0004_0000 {
                log::error!("unexpected DISA version {:#x}", h.version);
                return make_error(Error::BadVersion);
            }
            if want_partition_b && h.n_partitions != 2 {
                log::error!("partition B requested but n_partitions={}", h.n_partitions);
                return make_error(Error::BadSize);
            }
            offset_table = if h.active_table != 0 {
                h.offset_table1 as usize
            } else {
                h.offset_table0 as usize
            };
            size_table = h.size_table as usize;
            offset_partition_hash = 0x16C;
            if !want_partition_b {
                offset_partition = h.offset_partition_a as usize;
                size_partition = h.size_partition_a as usize;
                offset_difi = offset_table + h.offset_desc_a as usize;
            } else {
                offset_partition = h.offset_partition_b as usize;
                size_partition = h.size_partition_b as usize;
                offset_difi = offset_table + h.offset_desc_b as usize;
            }
        } else if magic == *b"DIFF" {
            if want_partition_b {
                log::error!("partition B requested for a DIFF container");
                return make_error(Error::BadSize);
            }
            let h: DiffHeader = read_struct(&file, 0x100)?;
            if h.version != 0x0003_0000 {
                log::error!("unexpected DIFF version {:#x}", h.version);
                return make_error(Error::BadVersion);
            }
            offset_partition = h.offset_partition as usize;
            size_partition = h.size_partition as usize;
            offset_table = if h.active_table != 0 {
                h.offset_table1 as usize
            } else {
                h.offset_table0 as usize
            };
            size_table = h.size_table as usize;
            offset_difi = offset_table;
            offset_partition_hash = 0x134;
        } else {
            log::error!("unrecognized container magic {:?}", magic);
            return make_error(Error::BadMagic);
        }

        let difi_probe_len = DIFI_HEADER_LEN + IVFC_DESC_LEN + DPFS_DESC_LEN + HASH_MIN_LEN;
        if offset_difi == 0
            || offset_difi + difi_probe_len > file_size
            || offset_partition + size_partition > file_size
        {
            return make_error(Error::BadOffset);
        }

        let difi: DifiHeader = read_struct(&file, offset_difi)?;
        if difi.magic != *b"DIFI" || difi.version != 0x0001_0000 {
            log::error!("unexpected DIFI magic/version");
            return make_error(Error::BadMagic);
        }
        if difi.offset_ivfc as usize != DIFI_HEADER_LEN
            || difi.size_ivfc as usize != IVFC_DESC_LEN
            || difi.offset_dpfs != difi.offset_ivfc + difi.size_ivfc
            || difi.size_dpfs as usize != DPFS_DESC_LEN
            || difi.offset_hash != difi.offset_dpfs + difi.size_dpfs
            || (difi.size_hash as usize) < HASH_MIN_LEN
        {
            log::error!("DIFI sub-offsets are not contiguous/exactly sized");
            return make_error(Error::BadSize);
        }

        let ivfc: IvfcDescriptor = read_struct(&file, offset_difi + difi.offset_ivfc as usize)?;
        if ivfc.magic != *b"IVFC" || ivfc.version != 0x0002_0000 {
            log::error!("unexpected IVFC magic/version");
            return make_error(Error::BadMagic);
        }

        let dpfs: DpfsDescriptor = read_struct(&file, offset_difi + difi.offset_dpfs as usize)?;
        if dpfs.magic != *b"DPFS" || dpfs.version != 0x0001_0000 {
            log::error!("unexpected DPFS magic/version");
            return make_error(Error::BadMagic);
        }

        if dpfs.offset_lvl1 + dpfs.size_lvl1 > dpfs.offset_lvl2
            || dpfs.offset_lvl2 + dpfs.size_lvl2 > dpfs.offset_lvl3
            || dpfs.offset_lvl3 + dpfs.size_lvl3 > size_partition as u64
            || dpfs.size_lvl1 == 0
            || dpfs.size_lvl2 == 0
            || dpfs.size_lvl3 == 0
            || dpfs.log_lvl2 < 2
            || dpfs.log_lvl2 > dpfs.log_lvl3
        {
            log::error!("DPFS level layout invariant violated");
            return make_error(Error::BadSize);
        }

        if ivfc.size_hash != difi.size_hash
            || ivfc.offset_lvl1 + ivfc.size_lvl1 > ivfc.offset_lvl2
            || ivfc.offset_lvl2 + ivfc.size_lvl2 > ivfc.offset_lvl3
            || ivfc.offset_lvl3 + ivfc.size_lvl3 > dpfs.size_lvl3
        {
            log::error!("IVFC level 1-3 layout invariant violated");
            return make_error(Error::BadSize);
        }

        let ivfc_use_extlvl4 = difi.ivfc_use_extlvl4 != 0;
        let offset_ivfc_lvl4;
        if !ivfc_use_extlvl4 {
            if ivfc.offset_lvl3 + ivfc.size_lvl3 > ivfc.offset_lvl4
                || ivfc.offset_lvl4 + ivfc.size_lvl4 > dpfs.size_lvl3
            {
                log::error!("IVFC level 4 (internal) layout invariant violated");
                return make_error(Error::BadSize);
            }
            offset_ivfc_lvl4 = ivfc.offset_lvl4 as usize;
        } else {
            let abs = offset_partition + difi.ivfc_offset_extlvl4 as usize;
            if abs as u64 + ivfc.size_lvl4 > (offset_partition + size_partition) as u64 {
                log::error!("IVFC level 4 (external) layout invariant violated");
                return make_error(Error::BadSize);
            }
            offset_ivfc_lvl4 = abs;
        }

        Ok(Descriptor {
            offset_table,
            size_table,
            offset_difi,
            offset_partition_hash,

            offset_dpfs_lvl1: offset_partition + dpfs.offset_lvl1 as usize,
            offset_dpfs_lvl2: offset_partition + dpfs.offset_lvl2 as usize,
            offset_dpfs_lvl3: offset_partition + dpfs.offset_lvl3 as usize,
            size_dpfs_lvl1: dpfs.size_lvl1 as usize,
            size_dpfs_lvl2: dpfs.size_lvl2 as usize,
            size_dpfs_lvl3: dpfs.size_lvl3 as usize,
            log_dpfs_lvl2: dpfs.log_lvl2,
            log_dpfs_lvl3: dpfs.log_lvl3,
            dpfs_lvl1_selector: difi.dpfs_lvl1_selector,

            offset_ivfc_lvl: [
                ivfc.offset_lvl1 as usize,
                ivfc.offset_lvl2 as usize,
                ivfc.offset_lvl3 as usize,
                offset_ivfc_lvl4,
            ],
            size_ivfc_lvl: [
                ivfc.size_lvl1 as usize,
                ivfc.size_lvl2 as usize,
                ivfc.size_lvl3 as usize,
                ivfc.size_lvl4 as usize,
            ],
            log_ivfc_lvl: [ivfc.log_lvl1, ivfc.log_lvl2, ivfc.log_lvl3, ivfc.log_lvl4],
            offset_master_hash: difi.offset_hash as usize,
            ivfc_use_extlvl4,
        })
    }
}
