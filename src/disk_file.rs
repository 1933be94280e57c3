use crate::error::*;
use crate::random_access_file::*;
use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;

/// A physical on-disk file opened for the lifetime of one read/write
/// operation. The position is cached so sequential access (the common case
/// for both DPFS run I/O and the IVFC hash-chain fixer) does not reissue a
/// seek for every call.
pub struct DiskFile {
    file: RefCell<File>,
    len: usize,
    pos: Cell<Option<u64>>,
}

impl DiskFile {
    pub fn new(file: File) -> Result<DiskFile, Error> {
        let len = file.metadata()?.len() as usize;
        Ok(DiskFile {
            file: RefCell::new(file),
            len,
            pos: Cell::new(None),
        })
    }

    fn seek_to(&self, file: &mut File, pos: u64) -> Result<(), Error> {
        if self.pos.get() != Some(pos) {
            file.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }
}

impl RandomAccessFile for DiskFile {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error> {
        if pos + buf.len() > self.len() {
            return make_error(Error::BadOffset);
        }
        let mut file = self.file.borrow_mut();
        self.seek_to(&mut file, pos as u64)?;
        file.read_exact(buf)?;
        self.pos.set(Some(pos as u64 + buf.len() as u64));
        Ok(())
    }
    fn write(&self, pos: usize, buf: &[u8]) -> Result<(), Error> {
        if pos + buf.len() > self.len() {
            return make_error(Error::BadOffset);
        }
        let mut file = self.file.borrow_mut();
        self.seek_to(&mut file, pos as u64)?;
        file.write_all(buf)?;
        self.pos.set(Some(pos as u64 + buf.len() as u64));
        Ok(())
    }
    fn len(&self) -> usize {
        self.len
    }
}

/// Opens `path` for the duration of one session: parsing, cache building,
/// or a read/write + hash-fix chain. Dropped at every exit path, including
/// errors, simply by going out of scope.
pub fn open_rw(path: &Path) -> Result<DiskFile, Error> {
    DiskFile::new(OpenOptions::new().read(true).write(true).open(path)?)
}

pub fn open_ro(path: &Path) -> Result<DiskFile, Error> {
    DiskFile::new(OpenOptions::new().read(true).open(path)?)
}
