//! Fixed-size binary particle records, used both for seed input and for the
//! accepted-particle output stream.
//!
//! Each record is 16 bytes: `parent_id: u32`, `x: f32`, `y: f32`, `z: f32`,
//! all little-endian. Seed particles carry [`NO_PARENT`].

use crate::vecmath::Vec3;
use anyhow::Result;
use std::io::{ErrorKind, Read, Write};
use zerocopy::byteorder::little_endian::{F32, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Parent ID written for particles that have no parent.
pub const NO_PARENT: u32 = u32::MAX;

/// Size in bytes of one encoded record.
pub const RECORD_SIZE: usize = std::mem::size_of::<ParticleRecord>();

/// On-the-wire layout of one particle.
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ParticleRecord {
    pub parent_id: U32,
    pub x: F32,
    pub y: F32,
    pub z: F32,
}

impl ParticleRecord {
    pub fn new(parent: Option<u32>, position: Vec3) -> Self {
        ParticleRecord {
            parent_id: U32::new(parent.unwrap_or(NO_PARENT)),
            x: F32::new(position.x as f32),
            y: F32::new(position.y as f32),
            z: F32::new(position.z as f32),
        }
    }

    /// `None` when the record carries the no-parent sentinel.
    pub fn parent(&self) -> Option<u32> {
        match self.parent_id.get() {
            NO_PARENT => None,
            id => Some(id),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x.get() as f64, self.y.get() as f64, self.z.get() as f64)
    }
}

/// Iterates over records until end-of-input.
///
/// A trailing partial record counts as end-of-input; only genuine I/O errors
/// are reported.
pub struct RecordReader<R: Read> {
    inner: R,
    finished: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        RecordReader { inner, finished: false }
    }

    /// Reads the next record, or `None` at end-of-input.
    pub fn read_record(&mut self) -> Result<Option<ParticleRecord>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < RECORD_SIZE {
            self.finished = true;
            if filled > 0 {
                log::warn!("Ignoring truncated trailing record ({} of {} bytes).", filled, RECORD_SIZE);
            }
            return Ok(None);
        }

        let record = ParticleRecord::read_from_bytes(&buf)
            .map_err(|_| anyhow::anyhow!("Record buffer has the wrong size."))?;
        Ok(Some(record))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<ParticleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Writes records to a byte stream.
pub struct RecordWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        RecordWriter { inner, written: 0 }
    }

    pub fn write_record(&mut self, record: &ParticleRecord) -> Result<()> {
        self.inner.write_all(record.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
