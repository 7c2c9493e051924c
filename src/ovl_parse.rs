use crate::types::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

fn bad_line(path: &Path, lineno: usize, msg: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}:{}: {}", path.display(), lineno, msg),
    )
}

/// Fragment table, TSV: id length mate_id library_id.
/// Ids must be 1..=n in order; the metadata store is addressed by id.
pub fn read_fragments(path: &Path) -> io::Result<FragmentInfo> {
    let reader = BufReader::new(File::open(path)?);
    let mut fi = FragmentInfo::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 4 {
            return Err(bad_line(path, lineno + 1, "expected 4 columns"));
        }
        let id: FragId = cols[0]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad fragment id"))?;
        let length: u32 = cols[1]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad length"))?;
        let mate: FragId = cols[2]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad mate id"))?;
        let lib: u32 = cols[3]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad library id"))?;
        let assigned = fi.push(length, mate, lib);
        if assigned != id {
            return Err(bad_line(
                path,
                lineno + 1,
                &format!("fragment ids must be dense and ordered; expected {}", assigned),
            ));
        }
    }
    log::info!("Read {} fragments from {}", fi.num_fragments(), path.display());
    Ok(fi)
}

/// Overlap table, TSV: a_id b_id a_hang b_hang orient(N/I) erate.
/// Records must be grouped by non-decreasing a_id; the in-degree
/// bookkeeping in the best-overlap scan depends on it, so a violation
/// is fatal here rather than silently miscounted later.
pub fn read_overlaps(path: &Path, fi: &FragmentInfo) -> io::Result<Vec<Overlap>> {
    let reader = BufReader::new(File::open(path)?);
    let mut overlaps = Vec::new();
    let mut last_a: FragId = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 6 {
            return Err(bad_line(path, lineno + 1, "expected 6 columns"));
        }
        let a_id: FragId = cols[0]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad a_id"))?;
        let b_id: FragId = cols[1]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad b_id"))?;
        let a_hang: i32 = cols[2]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad a_hang"))?;
        let b_hang: i32 = cols[3]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad b_hang"))?;
        let flipped = match cols[4] {
            "N" => false,
            "I" => true,
            _ => return Err(bad_line(path, lineno + 1, "orientation must be N or I")),
        };
        let erate: f32 = cols[5]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad error rate"))?;
        if !fi.valid(a_id) || !fi.valid(b_id) {
            return Err(bad_line(path, lineno + 1, "overlap references unknown fragment"));
        }
        if a_id == b_id {
            return Err(bad_line(path, lineno + 1, "self overlap"));
        }
        if a_id < last_a {
            return Err(bad_line(path, lineno + 1, "overlaps not sorted by a_id"));
        }
        last_a = a_id;
        overlaps.push(Overlap { a_id, b_id, a_hang, b_hang, flipped, erate });
    }
    log::info!("Read {} overlap records from {}", overlaps.len(), path.display());
    Ok(overlaps)
}

/// Library table, TSV: lib_id mean stddev sample_count.
pub fn read_libraries(path: &Path) -> io::Result<LibraryTable> {
    let reader = BufReader::new(File::open(path)?);
    let mut libs = LibraryTable::default();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 4 {
            return Err(bad_line(path, lineno + 1, "expected 4 columns"));
        }
        let lib: u32 = cols[0]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad library id"))?;
        let mean: f64 = cols[1]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad mean"))?;
        let stddev: f64 = cols[2]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad stddev"))?;
        let samples: u32 = cols[3]
            .parse()
            .map_err(|_| bad_line(path, lineno + 1, "bad sample count"))?;
        libs.insert(lib, LibraryStats { mean, stddev, samples });
    }
    log::info!("Read {} libraries from {}", libs.len(), path.display());
    Ok(libs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_read_fragments_ok() {
        let f = write_tmp("# id len mate lib\n1\t100\t2\t1\n2\t100\t1\t1\n");
        let fi = read_fragments(f.path()).unwrap();
        assert_eq!(fi.num_fragments(), 2);
        assert_eq!(fi.length(1), 100);
        assert_eq!(fi.mate_id(2), 1);
    }

    #[test]
    fn test_read_fragments_gap_rejected() {
        let f = write_tmp("1\t100\t0\t1\n3\t100\t0\t1\n");
        assert!(read_fragments(f.path()).is_err());
    }

    #[test]
    fn test_read_overlaps_unsorted_rejected() {
        let frags = write_tmp("1\t100\t0\t1\n2\t100\t0\t1\n3\t100\t0\t1\n");
        let fi = read_fragments(frags.path()).unwrap();
        let f = write_tmp("2\t1\t-80\t-80\tN\t0.01\n1\t2\t80\t80\tN\t0.01\n");
        assert!(read_overlaps(f.path(), &fi).is_err());
    }

    #[test]
    fn test_read_overlaps_ok() {
        let frags = write_tmp("1\t100\t0\t1\n2\t100\t0\t1\n");
        let fi = read_fragments(frags.path()).unwrap();
        let f = write_tmp("1\t2\t80\t80\tN\t0.01\n2\t1\t-80\t-80\tI\t0.01\n");
        let ovls = read_overlaps(f.path(), &fi).unwrap();
        assert_eq!(ovls.len(), 2);
        assert!(!ovls[0].flipped);
        assert!(ovls[1].flipped);
    }
}
