//! Sample records and their persistence.
pub mod dataset;

pub use dataset::{read_segments, DatasetHeader, DatasetWriter};

use std::io;

/// One acquisition cycle's result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Minutes since the acquisition loop started
    pub elapsed_minutes: f64,
    /// Measured voltage (V)
    pub volt: f64,
    /// Measured current (A)
    pub amp: f64,
}

/// Destination for samples produced by the acquisition loop.
///
/// Samples are handed over by value and are not retained by the loop. The sink
/// decides how much to buffer; `flush` must push everything appended so far to
/// durable storage.
pub trait SampleSink {
    /// Append one record
    fn append(&mut self, sample: Sample) -> io::Result<()>;

    /// Start a new segment; the next record belongs to it
    fn mark_segment_boundary(&mut self) -> io::Result<()>;

    /// Force buffered records to durable storage
    fn flush(&mut self) -> io::Result<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn append(&mut self, sample: Sample) -> io::Result<()> {
        (**self).append(sample)
    }

    fn mark_segment_boundary(&mut self) -> io::Result<()> {
        (**self).mark_segment_boundary()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// In-memory sink, useful for dry runs and tests
impl SampleSink for Vec<Sample> {
    fn append(&mut self, sample: Sample) -> io::Result<()> {
        self.push(sample);
        Ok(())
    }

    fn mark_segment_boundary(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
