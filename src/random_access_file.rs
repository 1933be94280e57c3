use crate::error::*;
use byte_struct::*;

/// Interface to a byte range that supports random access reads and writes.
///
/// Every implementation acts like a fixed-size `[u8; len()]`: a physical
/// file, an in-memory buffer, or a sub-range view of another
/// `RandomAccessFile`. Reads/writes outside `[0, len())` are an error.
pub trait RandomAccessFile {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error>;
    fn write(&self, pos: usize, buf: &[u8]) -> Result<(), Error>;
    fn len(&self) -> usize;
}

/// Reads a `ByteStruct` out of a `RandomAccessFile` at `pos`.
pub fn read_struct<T: ByteStruct>(f: &dyn RandomAccessFile, pos: usize) -> Result<T, Error> {
    let mut buf = vec![0; T::BYTE_LEN];
    f.read(pos, &mut buf)?;
    Ok(T::read_bytes(&buf))
}

#[cfg(test)]
/// A `RandomAccessFile` wrapper that counts the number of physical read/write
/// calls reaching the inner file, used to verify that DPFS run-merging
/// issues exactly one physical I/O per maximal same-selector run.
pub struct CountingFile<'a> {
    inner: &'a dyn RandomAccessFile,
    pub reads: std::cell::Cell<usize>,
    pub writes: std::cell::Cell<usize>,
}

#[cfg(test)]
impl<'a> CountingFile<'a> {
    pub fn new(inner: &'a dyn RandomAccessFile) -> Self {
        CountingFile {
            inner,
            reads: std::cell::Cell::new(0),
            writes: std::cell::Cell::new(0),
        }
    }
}

#[cfg(test)]
impl<'a> RandomAccessFile for CountingFile<'a> {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read(pos, buf)
    }
    fn write(&self, pos: usize, buf: &[u8]) -> Result<(), Error> {
        self.writes.set(self.writes.get() + 1);
        self.inner.write(pos, buf)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
}
