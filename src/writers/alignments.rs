
use anyhow::Context;
use log::debug;
use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use std::fs::File;
use std::path::Path;

/// Writes retained alignments to a BAM with the input header
pub struct AlignmentWriter {
    header: sam::Header,
    writer: bam::io::Writer<bgzf::io::MultithreadedWriter<File>>,
    written: u64
}

impl AlignmentWriter {
    /// Opens the output and writes the header
    /// # Arguments
    /// * `filename` - the output BAM path
    /// * `header` - copied from the input BAM
    /// * `threads` - number of compression threads, clamped to 1..=4
    pub fn new(filename: &Path, header: sam::Header, threads: usize) -> anyhow::Result<Self> {
        debug!("Opening {filename:?} for writing...");
        let file = File::create(filename)
            .with_context(|| format!("Error while creating {filename:?}:"))?;
        let w_threads = std::num::NonZeroUsize::new(threads.clamp(1, 4))
            .unwrap_or(std::num::NonZeroUsize::MIN);
        let bgzf_writer = bgzf::io::MultithreadedWriter::with_worker_count(w_threads, file);
        let mut writer = bam::io::Writer::from(bgzf_writer);
        writer.write_header(&header)
            .with_context(|| format!("Error while writing header to {filename:?}:"))?;
        Ok(Self {
            header, writer, written: 0
        })
    }

    /// Copies one record to the output
    pub fn write_record(&mut self, record: &bam::Record) -> anyhow::Result<()> {
        self.writer.write_record(&self.header, record)?;
        self.written += 1;
        Ok(())
    }

    /// Flushes the output and returns the number of records written
    pub fn finish(mut self) -> anyhow::Result<u64> {
        self.writer.get_mut().finish()
            .context("Error while finishing BAM output:")?;
        Ok(self.written)
    }
}
