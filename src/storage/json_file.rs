//! JSON documents on disk, replaced atomically.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::StoreError;

pub(crate) type StringMap = BTreeMap<String, String>;

/// Read a document, `None` if the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

/// Read the map, treating a missing file as empty.
pub(crate) fn read_map(path: &Path) -> Result<StringMap, StoreError> {
    Ok(read_json(path)?.unwrap_or_default())
}

/// Read the map for a read-modify-write. A file that cannot be parsed is
/// treated as empty so the write replaces it.
pub(crate) fn read_map_for_update(path: &Path, what: &str) -> Result<StringMap, StoreError> {
    match read_map(path) {
        Err(StoreError::Serialize(e)) if !e.is_io() => {
            tracing::warn!(what, path = %path.display(), error = %e, "Discarding unreadable file");
            Ok(StringMap::new())
        }
        other => other,
    }
}

/// Replace the file contents via a sibling temp file and rename.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, owner_only: bool) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let file = open_for_write(&tmp, owner_only)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn write_map(path: &Path, map: &StringMap, owner_only: bool) -> Result<(), StoreError> {
    write_json(path, map, owner_only)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn open_for_write(path: &Path, owner_only: bool) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if owner_only {
        options.mode(0o600);
    }
    let file = options.open(path)?;
    if owner_only {
        // mode() only applies on creation
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _owner_only: bool) -> io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_map(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/prefs.json");
        let mut map = StringMap::new();
        map.insert("a".into(), "b".into());
        write_map(&path, &map, false).unwrap();
        assert_eq!(read_map(&path).unwrap(), map);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_map(&path), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn test_update_read_discards_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "garbage").unwrap();
        assert!(read_map_for_update(&path, "test map").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        write_map(&path, &StringMap::new(), true).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
