// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Plain-text file formats: id lists (one decimal per line, `#` comments),
//! `prefix -> id` maps, result lists with an optional 1-based index
//! prefix, and optional `id -> label` maps.

use crate::Error;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

fn data_lines(path: &Path) -> Result<Vec<(usize, String)>, Error> {
    let file = File::open(path)?;
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push((lineno + 1, trimmed.to_string()));
    }
    Ok(out)
}

fn parse_id(path: &Path, lineno: usize, s: &str) -> Result<u128, Error> {
    s.parse::<u128>().map_err(|_| {
        Error::InvalidInput(format!(
            "{}:{}: unparseable id `{}`",
            path.display(),
            lineno,
            s
        ))
    })
}

/// Read an id file.
pub fn read_ids(path: &Path) -> Result<Vec<u128>, Error> {
    data_lines(path)?
        .into_iter()
        .map(|(lineno, s)| parse_id(path, lineno, &s))
        .collect()
}

/// Write an id file.
pub fn write_ids(path: &Path, ids: &[u128]) -> Result<(), Error> {
    let mut w = BufWriter::new(File::create(path)?);
    for id in ids {
        writeln!(w, "{}", id)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a `prefix -> id` map file.
pub fn read_prefix_map(path: &Path) -> Result<Vec<(String, u128)>, Error> {
    data_lines(path)?
        .into_iter()
        .map(|(lineno, s)| {
            let (prefix, id) = s.split_once(" -> ").ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{}:{}: expected `prefix -> id`",
                    path.display(),
                    lineno
                ))
            })?;
            Ok((prefix.to_string(), parse_id(path, lineno, id.trim())?))
        })
        .collect()
}

/// Write a `prefix -> id` map file.
pub fn write_prefix_map(path: &Path, entries: &[(String, u128)]) -> Result<(), Error> {
    let mut w = BufWriter::new(File::create(path)?);
    for (prefix, id) in entries {
        writeln!(w, "{} -> {}", prefix, id)?;
    }
    w.flush()?;
    Ok(())
}

/// Write a result file: receiver ids in the intersection, one per line,
/// with a 1-based index prefix.
pub fn write_result_ids(path: &Path, ids: &[u128]) -> Result<(), Error> {
    let mut w = BufWriter::new(File::create(path)?);
    for (i, id) in ids.iter().enumerate() {
        writeln!(w, "{}. {}", i + 1, id)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a result file, tolerating the optional index prefix.
pub fn read_result_ids(path: &Path) -> Result<Vec<u128>, Error> {
    data_lines(path)?
        .into_iter()
        .map(|(lineno, s)| {
            let id = match s.split_once(". ") {
                Some((idx, rest)) if idx.chars().all(|c| c.is_ascii_digit()) => rest.trim(),
                _ => s.as_str(),
            };
            parse_id(path, lineno, id)
        })
        .collect()
}

/// Read an optional `id -> label` map.
pub fn read_label_map(path: &Path) -> Result<HashMap<u128, String>, Error> {
    let mut out = HashMap::new();
    for (lineno, s) in data_lines(path)? {
        let (id, label) = s.split_once(" -> ").ok_or_else(|| {
            Error::InvalidInput(format!(
                "{}:{}: expected `id -> label`",
                path.display(),
                lineno
            ))
        })?;
        out.insert(parse_id(path, lineno, id.trim())?, label.trim().to_string());
    }
    Ok(out)
}

/// Dotted-quad rendering for 32-bit ids in reports.
pub fn ipv4_string(id: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (id >> 24) & 0xFF,
        (id >> 16) & 0xFF,
        (id >> 8) & 0xFF,
        id & 0xFF
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("fuzzypsi-files-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn test_ids_roundtrip_with_comments() {
        let path = scratch("ids");
        std::fs::write(&path, "# header\n123\n\n456\n").unwrap();
        assert_eq!(read_ids(&path).unwrap(), vec![123, 456]);
        write_ids(&path, &[7, 8]).unwrap();
        assert_eq!(read_ids(&path).unwrap(), vec![7, 8]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_bad_line_reports_position() {
        let path = scratch("bad");
        std::fs::write(&path, "12\nnope\n").unwrap();
        let err = read_ids(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref s) if s.contains(":2")));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_prefix_map_roundtrip() {
        let path = scratch("map");
        let entries = vec![("0101**".to_string(), 20u128), ("1111**".to_string(), 60)];
        write_prefix_map(&path, &entries).unwrap();
        assert_eq!(read_prefix_map(&path).unwrap(), entries);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_result_ids_with_and_without_index() {
        let path = scratch("results");
        write_result_ids(&path, &[10, 20]).unwrap();
        assert_eq!(read_result_ids(&path).unwrap(), vec![10, 20]);
        std::fs::write(&path, "10\n20\n").unwrap();
        assert_eq!(read_result_ids(&path).unwrap(), vec![10, 20]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_ipv4_string() {
        assert_eq!(ipv4_string(0xDA000001), "218.0.0.1");
    }
}
