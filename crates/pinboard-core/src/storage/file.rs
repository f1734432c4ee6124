//! Reading and writing board documents on the local filesystem.

use super::{BoardFile, FORMAT_VERSION, ItemSnapshot, StorageError, StorageResult};
use crate::item::{ItemId, encode_png};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File extension for board documents.
pub const DOCUMENT_EXTENSION: &str = "pinb";

/// Read and parse a document without decoding its images.
pub fn read_board_file(path: &Path) -> StorageResult<BoardFile> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.display().to_string()));
    }

    let json = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let file = BoardFile::from_json(&json)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))?;

    if file.version > FORMAT_VERSION {
        return Err(StorageError::Other(format!(
            "{} was written by a newer version (format {})",
            path.display(),
            file.version
        )));
    }
    let mut seen = HashSet::new();
    if let Some(record) = file.items.iter().find(|record| !seen.insert(record.save_id)) {
        return Err(StorageError::Serialization(format!(
            "{} has duplicate save id {}",
            path.display(),
            record.save_id
        )));
    }
    Ok(file)
}

/// Write `items` to `path`.
///
/// Unless `create_new`, an existing document is updated in place: images
/// of records whose save id is still present are reused, records of items
/// that are gone are dropped. Items without a save id get the next free
/// one. Returns the newly assigned ids. `on_record` is called after each
/// item with its index.
pub fn write_document(
    path: &Path,
    items: &[ItemSnapshot],
    create_new: bool,
    mut on_record: impl FnMut(usize),
) -> StorageResult<Vec<(ItemId, i64)>> {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let mut existing: HashMap<i64, String> = if !create_new && path.exists() {
        read_board_file(path)?
            .items
            .into_iter()
            .map(|record| (record.save_id, record.image))
            .collect()
    } else {
        HashMap::new()
    };

    let mut next_id = existing
        .keys()
        .copied()
        .chain(items.iter().filter_map(|item| item.save_id))
        .max()
        .map_or(1, |max| max + 1);

    let mut assigned = Vec::new();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let save_id = match item.save_id {
            Some(save_id) => save_id,
            None => {
                let save_id = next_id;
                next_id += 1;
                assigned.push((item.id, save_id));
                save_id
            }
        };
        let image = match existing.remove(&save_id) {
            Some(image) => image,
            None => {
                let png = encode_png(&item.pixels)
                    .map_err(|e| StorageError::Serialization(format!("Failed to encode image: {}", e)))?;
                STANDARD.encode(png)
            }
        };
        records.push(item.to_record(save_id, image));
        on_record(index);
    }

    let file = BoardFile {
        version: FORMAT_VERSION,
        items: records,
    };
    let json = file
        .to_json()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let temp = temp_path(path);
    fs::write(&temp, json)
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", temp.display(), e)))?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
    })?;
    Ok(assigned)
}

/// Sibling path written first so a failed save leaves the old file intact.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
