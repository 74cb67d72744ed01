use crate::model::Particle;
use anyhow::Result;
use dla_common::RecordWriter;
use std::io::Write;

/// Receives every accepted particle, in acceptance order.
pub trait ParticleSink {
    fn emit(&mut self, particle: &Particle) -> Result<()>;

    /// Called after the seed particles and after every committed round.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The binary particle stream.
impl<W: Write> ParticleSink for RecordWriter<W> {
    fn emit(&mut self, particle: &Particle) -> Result<()> {
        self.write_record(&particle.to_record())
    }

    fn flush(&mut self) -> Result<()> {
        RecordWriter::flush(self)
    }
}

/// Keeps particles in memory.
impl ParticleSink for Vec<Particle> {
    fn emit(&mut self, particle: &Particle) -> Result<()> {
        self.push(*particle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dla_common::{RecordReader, Vec3};

    #[test]
    fn test_record_writer_sink_encodes_particles() {
        let mut sink = RecordWriter::new(Vec::new());
        let seed = Particle { id: 0, position: Vec3::new(0.5, 0.0, -1.0), parent: None };
        let child = Particle { id: 1, position: Vec3::new(1.5, 0.0, -1.0), parent: Some(0) };
        sink.emit(&seed).unwrap();
        sink.emit(&child).unwrap();
        ParticleSink::flush(&mut sink).unwrap();

        let bytes = sink.into_inner();
        let records: Vec<_> = RecordReader::new(bytes.as_slice()).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].parent(), None);
        assert_eq!(records[0].position(), seed.position);
        assert_eq!(records[1].parent(), Some(0));
        assert_eq!(records[1].position(), child.position);
    }
}
