//src/reader.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Result, TreeError};

/// Opens a plain or gzip-compressed text file.
///
/// Files whose name ends in `.gz` are wrapped in a `MultiGzDecoder`, so
/// concatenated gzip members (as written by `cat a.gz b.gz`) are read through.
pub fn open_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| TreeError::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Reads every line of `path` after the first (header) line.
///
/// Returns `(line_number, line)` pairs with 1-based numbers counting the
/// header. Only the line terminator is stripped, so empty trailing fields
/// survive; blank lines are dropped.
pub fn read_data_lines<P: AsRef<Path>>(path: P) -> Result<(String, Vec<(usize, String)>)> {
    let path = path.as_ref();
    let reader = open_maybe_gz(path)?;

    let mut header = None;
    let mut lines = Vec::new();
    for (i, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| TreeError::io(path, e))?;
        if header.is_none() {
            header = Some(line);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        lines.push((i + 1, line));
    }

    match header {
        Some(h) => Ok((h, lines)),
        None => Err(TreeError::format(path, 1, "file is empty, expected a header line")),
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::{write_file, write_gz};
    use super::*;

    #[test]
    fn test_plain_and_gz_read_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let body = "taxon\tcount\nFirmicutes\t100\n\nClostridia\t60\n";
        let plain = write_file(dir.path(), "S1.phylum.counts.tsv", body);
        let gz = write_gz(dir.path(), "S1.phylum.counts.tsv.gz", body);

        let (h1, l1) = read_data_lines(&plain).unwrap();
        let (h2, l2) = read_data_lines(&gz).unwrap();
        assert_eq!(h1, "taxon\tcount");
        assert_eq!(h1, h2);
        assert_eq!(l1, l2);
        // blank line skipped, numbering keeps the gap
        assert_eq!(l1[0], (2, "Firmicutes\t100".to_string()));
        assert_eq!(l1[1], (4, "Clostridia\t60".to_string()));
    }

    #[test]
    fn test_trailing_empty_field_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "tree.tsv", "a\tb\r\nBacteria\t\r\n");
        let (header, lines) = read_data_lines(&path).unwrap();
        assert_eq!(header, "a\tb");
        assert_eq!(lines, vec![(2, "Bacteria\t".to_string())]);
    }

    #[test]
    fn test_empty_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.tsv", "");
        match read_data_lines(&path) {
            Err(TreeError::Format { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected format error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_maybe_gz(dir.path().join("nope.tsv")).err().unwrap();
        assert!(matches!(err, TreeError::Io { .. }));
    }
}
