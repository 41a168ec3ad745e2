//! `std::io` adapters so the writer drops in wherever a `Write` is expected.
//!
//! `Read` and `Seek` are implemented only to report `Unsupported`, matching
//! the inherent methods.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::writer::SegmentedAsyncWriter;

impl Write for SegmentedAsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut &*self)
    }
}

impl Write for &SegmentedAsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SegmentedAsyncWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        SegmentedAsyncWriter::flush(self).map_err(Into::into)
    }
}

impl Read for SegmentedAsyncWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SegmentedAsyncWriter::read(self, buf).map_err(Into::into)
    }
}

impl Seek for SegmentedAsyncWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        SegmentedAsyncWriter::seek(self, pos).map_err(Into::into)
    }
}
