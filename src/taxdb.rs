//src/taxdb.rs

use std::path::Path;

use crate::error::{Result, TreeError};
use crate::reader::read_data_lines;

/// One hierarchy line: ancestor names from the rank just below the root down
/// to the most specific taxon on that line.
pub type Lineage = Vec<String>;

/// Parses a taxa hierarchy file in the format:
/// ```text
/// <header>
/// <kingdom>\t<phylum>\t<class>\t<order>\t<family>\t<genus>\t<species>
/// ```
/// The header line is discarded and every data line must carry exactly
/// `columns` tab-separated names, counted before trimming so an empty last
/// column is reported as empty rather than missing. Names are trimmed. `.gz`
/// files are read transparently.
pub fn parse_hierarchy<P: AsRef<Path>>(filepath: P, columns: usize) -> Result<Vec<Lineage>> {
    let path = filepath.as_ref();
    let (_header, lines) = read_data_lines(path)?;

    let mut lineages = Vec::with_capacity(lines.len());
    for (line_no, line) in lines {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != columns {
            return Err(TreeError::format(
                path,
                line_no,
                format!(
                    "expected {} tab-separated ranks, found {}",
                    columns,
                    parts.len()
                ),
            ));
        }

        let lineage: Lineage = parts.iter().map(|p| p.trim().to_string()).collect();
        if let Some(pos) = lineage.iter().position(|n| n.is_empty()) {
            return Err(TreeError::format(
                path,
                line_no,
                format!("empty taxon name in column {}", pos + 1),
            ));
        }
        lineages.push(lineage);
    }

    log::debug!("Parsed {} lineages from {}", lineages.len(), path.display());
    Ok(lineages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_util::{write_file, write_gz};

    const HEADER: &str = "kingdom\tphylum\tclass\torder\tfamily\tgenus\tspecies\n";

    #[test]
    fn test_parse_hierarchy_lines() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}Bacteria\tFirmicutes\tClostridia\tClostridiales\tLachnospiraceae\tBlautia\tBlautia_obeum\n\
             Bacteria\tFirmicutes \tBacilli\tLactobacillales\tLactobacillaceae\tLactobacillus\tNA\n",
            HEADER
        );
        let path = write_gz(dir.path(), "taxa_tree.tsv.gz", &body);
        let lineages = parse_hierarchy(&path, 7).unwrap();
        assert_eq!(lineages.len(), 2);
        assert_eq!(lineages[1][1], "Firmicutes");
        assert_eq!(lineages[1][6], "NA");
    }

    #[test]
    fn test_wrong_column_count_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}Bacteria\tFirmicutes\tClostridia\tClostridiales\tLachnospiraceae\tBlautia\tBlautia_obeum\n\
             Bacteria\tFirmicutes\tBacilli\n",
            HEADER
        );
        let path = write_file(dir.path(), "taxa_tree.tsv", &body);
        match parse_hierarchy(&path, 7) {
            Err(TreeError::Format { line, message, .. }) => {
                assert_eq!(line, 3);
                assert!(message.contains("found 3"));
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_last_column_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}Bacteria\tFirmicutes\tClostridia\tClostridiales\tLachnospiraceae\tBlautia\t\r\n",
            HEADER
        );
        let path = write_file(dir.path(), "taxa_tree.tsv", &body);
        match parse_hierarchy(&path, 7) {
            Err(TreeError::Format { line, message, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(message, "empty taxon name in column 7");
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }
}
