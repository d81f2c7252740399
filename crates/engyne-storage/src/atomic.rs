// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic snapshot writes and JSON-lines helpers.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use engyne_core::EngyneError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::warn;

/// Replace `path` with `bytes` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngyneError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| EngyneError::storage(e.error))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EngyneError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read a JSON snapshot. A missing or unparsable file reads as `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unparsable, treating as absent");
            None
        }
    }
}

/// Append one JSON record as a single line.
///
/// A torn tail left by an earlier crash is terminated first so the new
/// record always lands on its own line.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), EngyneError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut line = Vec::new();
    if has_torn_tail(path)? {
        line.push(b'\n');
    }
    serde_json::to_writer(&mut line, value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

fn has_torn_tail(path: &Path) -> Result<bool, EngyneError> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Raw lines of a JSON-lines file, empty when the file is missing.
///
/// A trailing line without a newline (a torn append) is dropped.
pub fn read_lines(path: &Path) -> Result<Vec<String>, EngyneError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        if let Some(line) = buf.strip_suffix('\n') {
            lines.push(line.trim_end_matches('\r').to_string());
        }
    }
    Ok(lines)
}

/// Parsed records of a JSON-lines file, skipping blank and malformed lines.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, EngyneError> {
    let mut records = Vec::new();
    for (index, line) in read_lines(path)?.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = index, error = %e, "skipping malformed line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        write_json_atomic(&path, &Rec { n: 1 }).unwrap();
        write_json_atomic(&path, &Rec { n: 2 }).unwrap();
        assert_eq!(read_json::<Rec>(&path), Some(Rec { n: 2 }));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "state.json")
            .collect();
        assert!(leftovers.is_empty(), "temp files must not linger");
    }

    #[test]
    fn tolerant_reader_treats_garbage_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert_eq!(read_json::<Rec>(&path), None);
        fs::write(&path, b"{\"n\": ").unwrap();
        assert_eq!(read_json::<Rec>(&path), None);
    }

    #[test]
    fn jsonl_skips_torn_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        append_jsonl(&path, &Rec { n: 1 }).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"not json\n{\"n\": 3").unwrap();
        }
        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records, vec![Rec { n: 1 }]);
        assert_eq!(read_lines(&path).unwrap().len(), 2);

        append_jsonl(&path, &Rec { n: 4 }).unwrap();
        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records, vec![Rec { n: 1 }, Rec { n: 4 }]);
    }
}
