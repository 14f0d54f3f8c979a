use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::ArchiveError;

/// What goes into one archive.
///
/// `files` and `dirs` are relative to `root`; those relative paths become the
/// entry names.
#[derive(Debug, Clone)]
pub struct ArchiveSpec {
    pub archive_path: PathBuf,
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

pub async fn write_archive(spec: ArchiveSpec) -> Result<(), ArchiveError> {
    tokio::task::spawn_blocking(move || write_archive_blocking(&spec))
        .await
        .map_err(ArchiveError::Join)?
}

/// Write `spec` into a fresh archive, replacing any file already there.
///
/// Each top-level file or directory is read on its own thread; entries are
/// written one at a time through a shared writer. On failure the archive is
/// still finished and left on disk, but it may be missing entries.
pub fn write_archive_blocking(spec: &ArchiveSpec) -> Result<(), ArchiveError> {
    let file = File::create(&spec.archive_path).map_err(|source| ArchiveError::Create {
        path: spec.archive_path.clone(),
        source,
    })?;
    let writer = Mutex::new(ZipWriter::new(file));

    let (failures_tx, failures_rx) = mpsc::sync_channel(spec.files.len() + spec.dirs.len());
    std::thread::scope(|scope| {
        for file in &spec.files {
            let writer = &writer;
            let failures_tx = failures_tx.clone();
            scope.spawn(move || {
                if let Err(err) = add_file(writer, &spec.root, file) {
                    let _ = failures_tx.try_send(err);
                }
            });
        }

        for dir in &spec.dirs {
            let writer = &writer;
            let failures_tx = failures_tx.clone();
            scope.spawn(move || {
                if let Err(err) = add_dir(writer, &spec.root, dir) {
                    let _ = failures_tx.try_send(err);
                }
            });
        }
    });
    drop(failures_tx);

    let zip = writer.into_inner().unwrap_or_else(PoisonError::into_inner);
    let finished = zip.finish().map_err(|source| ArchiveError::Finish {
        path: spec.archive_path.clone(),
        source,
    });

    if let Ok(err) = failures_rx.try_recv() {
        return Err(err);
    }
    finished?;

    tracing::debug!(path = %spec.archive_path.display(), "archive written");
    Ok(())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

fn entry_name(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

fn add_file(
    writer: &Mutex<ZipWriter<File>>,
    root: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let path = root.join(relative);
    let data = std::fs::read(&path).map_err(|source| ArchiveError::Read { path, source })?;

    let name = entry_name(relative);
    let mut zip = writer.lock().map_err(|_| ArchiveError::Poisoned)?;
    zip.start_file(name.as_str(), entry_options())
        .map_err(|source| ArchiveError::Entry {
            name: name.clone(),
            source,
        })?;
    zip.write_all(&data)
        .map_err(|source| ArchiveError::Write { name, source })?;
    Ok(())
}

// Directory entries themselves are not written, so empty directories leave
// no trace in the archive.
fn add_dir(
    writer: &Mutex<ZipWriter<File>>,
    root: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let dir = root.join(relative);
    let walk_err = |source| ArchiveError::Walk {
        path: dir.clone(),
        source,
    };

    let mut entries = std::fs::read_dir(&dir)
        .map_err(walk_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(walk_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let child = relative.join(entry.file_name());
        let file_type = entry.file_type().map_err(walk_err)?;
        if file_type.is_dir() {
            add_dir(writer, root, &child)?;
        } else if file_type.is_file() {
            add_file(writer, root, &child)?;
        }
    }

    Ok(())
}
