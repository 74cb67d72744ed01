//! Side outputs: periodic round statistics and a CSV dump of the aggregate.

use crate::model::Particle;
use anyhow::{Context, Result};
use dla_common::{OutputConfig, RoundSnapshot, StatsFormat};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Keeps every `interval`-th round snapshot plus the most recent one.
#[derive(Debug)]
pub struct StatsRecorder {
    interval: u64,
    snapshots: Vec<RoundSnapshot>,
    latest: Option<RoundSnapshot>,
}

impl StatsRecorder {
    pub fn new(interval: u64) -> Self {
        StatsRecorder {
            interval: interval.max(1),
            snapshots: Vec::new(),
            latest: None,
        }
    }

    pub fn observe(&mut self, snapshot: &RoundSnapshot) {
        if (snapshot.round + 1) % self.interval == 0 {
            self.snapshots.push(snapshot.clone());
            self.latest = None;
        } else {
            self.latest = Some(snapshot.clone());
        }
    }

    /// Recorded snapshots, including the last round seen.
    pub fn finish(mut self) -> Vec<RoundSnapshot> {
        if let Some(latest) = self.latest.take() {
            self.snapshots.push(latest);
        }
        self.snapshots
    }
}

/// File the round statistics are written to, e.g. `dla_rounds.json`.
pub fn stats_path(output: &OutputConfig) -> PathBuf {
    let extension = match output.stats_format {
        StatsFormat::Json => "json",
        StatsFormat::Bincode => "bin",
        StatsFormat::Messagepack => "msgpack",
    };
    PathBuf::from(format!("{}_rounds.{}", output.base_filename, extension))
}

/// File the final aggregate is written to, e.g. `dla_particles.csv`.
pub fn positions_path(output: &OutputConfig) -> PathBuf {
    PathBuf::from(format!("{}_particles.csv", output.base_filename))
}

/// Serializes the snapshots in the configured format.
pub fn write_snapshots<W: Write>(writer: W, format: StatsFormat, snapshots: &[RoundSnapshot]) -> Result<()> {
    let mut writer = writer;
    match format {
        StatsFormat::Json => serde_json::to_writer(&mut writer, snapshots)
            .context("Error serializing round statistics to JSON")?,
        StatsFormat::Bincode => bincode::serialize_into(&mut writer, snapshots)
            .context("Error serializing round statistics to bincode")?,
        StatsFormat::Messagepack => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Error serializing round statistics to MessagePack")?,
    }
    writer.flush()?;
    Ok(())
}

pub fn save_snapshots(output: &OutputConfig, snapshots: &[RoundSnapshot]) -> Result<PathBuf> {
    let path = stats_path(output);
    let file = File::create(&path)
        .with_context(|| format!("Error creating statistics file '{}'", path.display()))?;
    write_snapshots(BufWriter::new(file), output.stats_format, snapshots)?;
    info!("{} round snapshots saved to {}", snapshots.len(), path.display());
    Ok(path)
}

/// Writes `id,parent_id,x,y,z` rows; seeds have an empty parent_id.
pub fn save_particles_csv<P: AsRef<Path>>(path: P, particles: &[Particle]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating CSV file '{}'", path.display()))?;
    writer.write_record(["id", "parent_id", "x", "y", "z"])?;
    for particle in particles {
        writer.write_record(&[
            particle.id.to_string(),
            particle.parent.map(|p| p.to_string()).unwrap_or_default(),
            format!("{:.4}", particle.position.x),
            format!("{:.4}", particle.position.y),
            format!("{:.4}", particle.position.z),
        ])?;
    }
    writer.flush()?;
    info!("{} particles saved to {}", particles.len(), path.display());
    Ok(())
}
