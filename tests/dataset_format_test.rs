//! Dataset file format and plot script stability.

use std::path::Path;

use chrono::Local;
use psu_ramp::data::{read_segments, DatasetHeader, DatasetWriter, Sample, SampleSink};
use psu_ramp::plot::{render, PlotMode};
use tempfile::TempDir;

fn samples(count: usize, offset: f64) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let i = i as f64;
            Sample {
                elapsed_minutes: offset + i / 60.0,
                volt: 0.123_456 * i,
                amp: -0.000_051 + 0.01 * i,
            }
        })
        .collect()
}

#[test]
fn test_segment_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("round_trip.dat");
    let first = samples(4, 0.0);
    let second = samples(3, 1.0);

    let mut writer = DatasetWriter::open(&path).unwrap();
    writer
        .write_header(&DatasetHeader::new("psu-ramp test", "round trip"))
        .unwrap();
    for s in &first {
        writer.append(*s).unwrap();
    }
    writer.mark_segment_boundary().unwrap();
    for s in &second {
        writer.append(*s).unwrap();
    }
    writer.close(Local::now()).unwrap();

    // Exactly two blank lines between record N and record N+1
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let data_start = lines.iter().position(|l| !l.starts_with('#')).unwrap();
    let boundary = data_start + first.len();
    assert_eq!(lines[boundary], "");
    assert_eq!(lines[boundary + 1], "");
    assert!(!lines[boundary + 2].is_empty());
    assert!(!lines[boundary - 1].is_empty());

    let segments = read_segments(&path).unwrap();
    assert_eq!(segments.len(), 2);
    for (written, read) in [(&first, &segments[0]), (&second, &segments[1])] {
        assert_eq!(written.len(), read.len());
        for (s, r) in written.iter().zip(read) {
            assert!((s.elapsed_minutes - r[0]).abs() <= 5e-5);
            assert!((s.volt - r[1]).abs() <= 5e-5);
            assert!((s.amp - r[2]).abs() <= 5e-5);
        }
    }
}

#[test]
fn test_header_block() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("header.dat");

    let mut writer = DatasetWriter::open(&path).unwrap();
    writer
        .write_header(&DatasetHeader::new("psu-ramp 0.1.0", "LiFePO4 cell, 20 C"))
        .unwrap();
    writer.close(Local::now()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "# psu-ramp 0.1.0");
    assert_eq!(lines[1], "# LiFePO4 cell, 20 C");
    assert!(lines[2].starts_with("# Start: "));
    assert_eq!(lines[3], "# min\tVolt\tAmpere");
    assert!(lines[4].starts_with("# Stop: "));
    assert!(read_segments(&path).unwrap().is_empty());
}

#[test]
fn test_render_is_idempotent() {
    let path = Path::new("/data/cell 7.dat");
    for mode in [PlotMode::Ramp, PlotMode::TimeSeries] {
        for second in [false, true] {
            assert_eq!(render(mode, path, second), render(mode, path, second));
        }
    }
}
