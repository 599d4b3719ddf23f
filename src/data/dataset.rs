//! Tab-separated dataset files.
//!
//! # Format
//!
//! ```text
//! # psu-ramp 0.1.0
//! # <comment>
//! # Start: Thu Oct 16 09:30:00 2026
//! # min	Volt	Ampere
//! 0.0167	1.0000	0.1000
//! 0.0333	2.0000	0.2000
//!
//!
//! 0.0500	1.0000	0.1000
//! # Stop: Thu Oct 16 09:31:00 2026
//!
//! ```
//!
//! Each data line holds elapsed minutes, voltage and current with four decimals,
//! separated by single tabs. A segment boundary is exactly two blank lines, which
//! gnuplot addresses with `index 0` / `index 1`. The footer is followed by one empty
//! line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::data::{Sample, SampleSink};
use crate::error::AppResult;

/// `ctime`-style timestamp, e.g. `Thu Oct  2 09:30:00 2026`
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// One data line, without terminator
pub fn format_sample(sample: &Sample) -> String {
    format!(
        "{:.4}\t{:.4}\t{:.4}",
        sample.elapsed_minutes, sample.volt, sample.amp
    )
}

/// Metadata written at the top of every dataset
#[derive(Debug, Clone)]
pub struct DatasetHeader {
    /// Program name and version
    pub program: String,
    /// Free-text comment from the operator
    pub comment: String,
    /// Local time the run started
    pub started_at: DateTime<Local>,
}

impl DatasetHeader {
    /// Header stamped with the current time
    pub fn new(program: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            comment: comment.into(),
            started_at: Local::now(),
        }
    }

    fn lines(&self) -> String {
        format!(
            "# {}\n# {}\n# Start: {}\n# min\tVolt\tAmpere\n",
            self.program,
            self.comment,
            format_timestamp(&self.started_at)
        )
    }
}

/// Append-only writer for one dataset file.
///
/// Records are buffered; [`SampleSink::flush`] pushes them to the file and syncs
/// it. [`DatasetWriter::close`] writes the footer and is idempotent. A writer that
/// is dropped without being closed closes itself with the current time.
pub struct DatasetWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl DatasetWriter {
    /// Create (or truncate) the dataset file
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        info!(path = %path.display(), "Dataset opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            records: 0,
        })
    }

    /// Write the comment header block
    pub fn write_header(&mut self, header: &DatasetHeader) -> AppResult<()> {
        self.writer()?.write_all(header.lines().as_bytes())?;
        Ok(())
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Whether the footer has been written
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Write the footer, flush and sync. Later calls do nothing.
    pub fn close(&mut self, stopped_at: DateTime<Local>) -> AppResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        write!(writer, "# Stop: {}\n\n", format_timestamp(&stopped_at))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        info!(path = %self.path.display(), records = self.records, "Dataset closed");
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "dataset already closed")
        })
    }
}

impl SampleSink for DatasetWriter {
    fn append(&mut self, sample: Sample) -> io::Result<()> {
        let line = format_sample(&sample);
        writeln!(self.writer()?, "{line}")?;
        self.records += 1;
        Ok(())
    }

    fn mark_segment_boundary(&mut self) -> io::Result<()> {
        self.writer()?.write_all(b"\n\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

impl Drop for DatasetWriter {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.close(Local::now()) {
                warn!(path = %self.path.display(), error = %e, "Failed to close dataset");
            }
        }
    }
}

/// Read a dataset back as segments of `[minutes, volt, amp]` triples.
///
/// Comment lines are skipped. A run of two or more blank lines between data lines
/// starts a new segment; a single blank line does not.
pub fn read_segments(path: impl AsRef<Path>) -> AppResult<Vec<Vec<[f64; 3]>>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut segments: Vec<Vec<[f64; 3]>> = Vec::new();
    let mut current: Vec<[f64; 3]> = Vec::new();
    let mut blank_run = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }

        if blank_run >= 2 && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        blank_run = 0;

        let mut triple = [0.0; 3];
        let mut fields = trimmed.split('\t');
        for slot in triple.iter_mut() {
            *slot = fields
                .next()
                .and_then(|f| f.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line {}: malformed record '{trimmed}'", index + 1),
                    )
                })?;
        }
        current.push(triple);
    }

    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(t: f64, v: f64, a: f64) -> Sample {
        Sample {
            elapsed_minutes: t,
            volt: v,
            amp: a,
        }
    }

    #[test]
    fn test_timestamp_matches_ctime() {
        let at = Local.with_ymd_and_hms(2026, 10, 2, 9, 5, 7).unwrap();
        assert_eq!(format_timestamp(&at), "Fri Oct  2 09:05:07 2026");
    }

    #[test]
    fn test_sample_line() {
        assert_eq!(
            format_sample(&sample(0.016666, 12.00949, -0.00051)),
            "0.0167\t12.0095\t-0.0005"
        );
    }

    #[test]
    fn test_full_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.dat");
        let start = Local.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        let stop = Local.with_ymd_and_hms(2026, 10, 16, 9, 31, 0).unwrap();

        let mut writer = DatasetWriter::open(&path).unwrap();
        writer
            .write_header(&DatasetHeader {
                program: "psu-ramp 0.1.0".into(),
                comment: "cell 7".into(),
                started_at: start,
            })
            .unwrap();
        writer.append(sample(0.5, 1.0, 0.1)).unwrap();
        writer.mark_segment_boundary().unwrap();
        writer.append(sample(1.0, 0.0, 0.0)).unwrap();
        writer.close(stop).unwrap();
        writer.close(stop).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# psu-ramp 0.1.0\n# cell 7\n# Start: Fri Oct 16 09:30:00 2026\n# min\tVolt\tAmpere\n\
             0.5000\t1.0000\t0.1000\n\n\n1.0000\t0.0000\t0.0000\n\
             # Stop: Fri Oct 16 09:31:00 2026\n\n"
        );
        assert_eq!(writer.records(), 2);
    }

    #[test]
    fn test_append_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = DatasetWriter::open(temp_dir.path().join("x.dat")).unwrap();
        writer.close(Local::now()).unwrap();
        assert!(writer.is_closed());
        assert!(writer.append(sample(0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_drop_writes_footer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dropped.dat");
        {
            let mut writer = DatasetWriter::open(&path).unwrap();
            writer.append(sample(0.1, 2.0, 0.2)).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("0.1000\t2.0000\t0.2000\n# Stop: "));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_read_segments_ignores_single_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manual.dat");
        std::fs::write(&path, "# c\n1\t2\t3\n\n4\t5\t6\n\n\n7\t8\t9\n# Stop\n\n").unwrap();

        let segments = read_segments(&path).unwrap();
        assert_eq!(
            segments,
            vec![
                vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
                vec![[7.0, 8.0, 9.0]]
            ]
        );
    }

    #[test]
    fn test_read_segments_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.dat");
        std::fs::write(&path, "1\t2\n").unwrap();
        assert!(read_segments(&path).is_err());
    }
}
