//! File-backed document store with file locking.
//!
//! Documents are pretty-printed JSON files written atomically; subcollections
//! are JSON Lines files appended under an exclusive lock. Path segments are
//! percent-encoded into file names, so `users/u1/progress/c1` lands at
//! `<root>/users/u1/progress/c1.json` and a subcollection with the same path
//! at `c1.jsonl`.

use crate::store::{merge_fields, DocPath, DocumentStore};
use crate::{Error, Result};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One line of a subcollection file
#[derive(Debug, Serialize, Deserialize)]
struct SubcollectionLine {
    id: String,
    data: Value,
}

/// Document store rooted at a directory
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, path: &DocPath, extension: &str) -> Result<PathBuf> {
        let (last, parents) = path
            .segments()
            .split_last()
            .ok_or_else(|| Error::Store("empty document path".into()))?;

        let mut file = self.root.clone();
        for segment in parents {
            file.push(encode_segment(segment));
        }
        file.push(format!("{}.{}", encode_segment(last), extension));
        Ok(file)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9_-]`
fn encode_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "%".into();
    }

    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Store(format!("file store task failed: {}", e)))?
}

/// Read a document with a shared lock
///
/// Missing files read as None. Unreadable or corrupted files are logged and
/// also read as None.
fn read_document(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Unable to open document {:?}: {}. Treating as absent.", path, e);
            return Ok(None);
        }
    };

    if let Err(e) = file.lock_shared() {
        tracing::warn!("Unable to lock document {:?}: {}. Treating as absent.", path, e);
        return Ok(None);
    }

    let mut contents = String::new();
    let mut reader = BufReader::new(&file);
    if let Err(e) = reader.read_to_string(&mut contents) {
        let _ = file.unlock();
        tracing::warn!("Failed to read document {:?}: {}. Treating as absent.", path, e);
        return Ok(None);
    }

    file.unlock()?;

    match serde_json::from_str::<Value>(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Failed to parse document {:?}: {}. Treating as absent.", path, e);
            Ok(None)
        }
    }
}

/// Atomically replace a document
///
/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the original.
fn write_document(path: &Path, value: &Value) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Store(format!("document path {:?} has no parent", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Wrote document {:?}", path);
    Ok(())
}

fn append_line(path: &Path, line: &SubcollectionLine) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let mut writer = std::io::BufWriter::new(&file);
    serde_json::to_writer(&mut writer, line)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);

    file.unlock()?;
    tracing::debug!("Appended record {} to {:?}", line.id, path);
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<SubcollectionLine>(&line) {
            Ok(entry) => records.push(entry.data),
            Err(e) => {
                tracing::warn!("Failed to parse record at {:?}:{}: {}", path, line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    Ok(records)
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get_document(&self, path: &DocPath) -> Result<Option<Value>> {
        let file = self.file_for(path, "json")?;
        blocking(move || read_document(&file)).await
    }

    async fn update_document(&self, path: &DocPath, partial: Value) -> Result<()> {
        let file = self.file_for(path, "json")?;
        blocking(move || {
            let mut document = read_document(&file)?.unwrap_or(Value::Null);
            merge_fields(&mut document, partial)?;
            write_document(&file, &document)
        })
        .await
    }

    async fn append_to_subcollection(&self, path: &DocPath, record: Value) -> Result<String> {
        let file = self.file_for(path, "jsonl")?;
        let line = SubcollectionLine {
            id: uuid::Uuid::new_v4().to_string(),
            data: record,
        };
        blocking(move || {
            append_line(&file, &line)?;
            Ok(line.id)
        })
        .await
    }

    async fn read_subcollection(&self, path: &DocPath) -> Result<Vec<Value>> {
        let file = self.file_for(path, "jsonl")?;
        blocking(move || read_lines(&file)).await
    }
}
