//! Line-oriented file I/O used for job inputs and artifacts.
//!
//! Every artifact is written through a temporary file in the destination
//! directory and renamed into place, so readers never observe a partial file.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CommonError, ErrorContext, Result};

/// Field delimiter of the intermediate `key\tvalue` format.
pub const KV_DELIMITER: char = '\t';

/// Create a directory (and its parents) if it doesn't exist.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)
            .with_io_context(|| format!("creating directory {}", path.display()))?;
    }
    Ok(())
}

/// Remove a file if it exists.
pub fn remove_file_if_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_file(path).with_io_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}

/// Expand an input path into the files it names.
///
/// A directory expands to its regular files sorted by file name so that the
/// resulting record order never depends on directory iteration order.
pub fn list_input_files<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(CommonError::not_found_error(format!(
            "input path {} does not exist",
            path.display()
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).with_io_context(|| format!("listing {}", path.display()))? {
        let entry = entry.with_io_context(|| format!("listing {}", path.display()))?;
        let entry_path = entry.path();
        if entry_path.is_file() {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read all non-empty lines of a file, with trailing `\r` removed.
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = fs::File::open(path).with_io_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for line in reader.lines() {
        let mut line = line.with_io_context(|| format!("reading {}", path.display()))?;
        if line.ends_with('\r') {
            line.pop();
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Split an intermediate line into key and value at the first delimiter.
///
/// A line without a delimiter is a key with an empty value.
pub fn split_kv(line: &str) -> (&str, &str) {
    line.split_once(KV_DELIMITER).unwrap_or((line, ""))
}

/// Format a key and value as one intermediate line (without newline).
pub fn format_kv(key: &str, value: &str) -> String {
    let mut line = String::with_capacity(key.len() + value.len() + 1);
    line.push_str(key);
    line.push(KV_DELIMITER);
    line.push_str(value);
    line
}

/// Atomically replace `path` with the given lines, newline terminated.
pub fn write_lines_atomic<P, I, S>(path: P, lines: I) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let mut tmp = temp_file_beside(path)?;
    let mut bytes = 0u64;
    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        for line in lines {
            let line = line.as_ref();
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .with_io_context(|| format!("writing {}", path.display()))?;
            bytes += line.len() as u64 + 1;
        }
        writer
            .flush()
            .with_io_context(|| format!("flushing {}", path.display()))?;
    }
    persist(tmp, path)?;
    debug!(path = %path.display(), bytes, "artifact written");
    Ok(bytes)
}

/// Atomically replace `path` with the pretty-printed JSON encoding of `value`.
pub fn write_json_atomic<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let body = serde_json::to_vec_pretty(value)
        .with_serialization_context(|| format!("encoding {}", path.display()))?;
    let mut tmp = temp_file_beside(path)?;
    tmp.write_all(&body)
        .with_io_context(|| format!("writing {}", path.display()))?;
    persist(tmp, path)
}

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir_exists(&dir)?;
    NamedTempFile::new_in(&dir)
        .with_io_context(|| format!("creating temporary file in {}", dir.display()))
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path).map(|_| ()).map_err(|e| {
        CommonError::io_error_with_source(format!("renaming into {}", path.display()), e.error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_and_format_kv() {
        assert_eq!(split_kv("u1\tposts:3"), ("u1", "posts:3"));
        assert_eq!(split_kv("u1\ta\tb"), ("u1", "a\tb"));
        assert_eq!(split_kv("lonely"), ("lonely", ""));
        assert_eq!(format_kv("c9", "42"), "c9\t42");
    }

    #[test]
    fn test_write_then_read_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.tsv");

        let bytes = write_lines_atomic(&path, ["a\t1", "b\t2"]).unwrap();
        assert_eq!(bytes, 8);
        assert_eq!(read_lines(&path).unwrap(), vec!["a\t1", "b\t2"]);
    }

    #[test]
    fn test_read_lines_skips_blank_and_strips_cr() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "one\r\n\ntwo\n").unwrap();

        assert_eq!(read_lines(&path).unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_list_input_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "x").unwrap();
        fs::write(dir.path().join("a.txt"), "y").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_input_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        let missing = list_input_files(dir.path().join("nope")).unwrap_err();
        assert!(matches!(missing, CommonError::NotFoundError { .. }));
    }

    #[test]
    fn test_write_json_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        write_json_atomic(&path, &serde_json::json!({"jobs": 2})).unwrap();

        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["jobs"], 2);
    }
}
