/// Artifact packing and unpacking
///
/// The persisted artifact format is fixed for cross-version restore
/// compatibility: `<instance>_<YYYY-MM-DD_HHMMSS>.tar.gz` containing the
/// `.sql` dump at top level plus the `config/` tree. Plain (uncompressed)
/// tar helpers cover the config round-trip through `docker cp`.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

use crate::core::error::StepError;
use crate::utils::constants::{ARTIFACT_SUFFIX, CONFIG_DIR};

pub fn artifact_file_name(instance_name: &str, timestamp: &str) -> String {
    format!("{instance_name}_{timestamp}{ARTIFACT_SUFFIX}")
}

pub fn dump_file_name(instance_name: &str, timestamp: &str) -> String {
    format!("{instance_name}_{timestamp}.sql")
}

/// Dump file name implied by an artifact name
/// (`demo_2024-01-01_120000.tar.gz` -> `demo_2024-01-01_120000.sql`).
pub fn dump_name_for_artifact(artifact: &Path) -> Option<String> {
    let name = artifact.file_name()?.to_str()?;
    let stem = name.strip_suffix(ARTIFACT_SUFFIX)?;
    Some(format!("{stem}.sql"))
}

/// Write the final backup artifact: dump file at top level, `config/` tree.
pub fn pack_backup(archive: &Path, dump_file: &Path, config_dir: &Path) -> Result<(), StepError> {
    let file = File::create(archive)
        .map_err(|e| StepError::archive(&format!("cannot create {}", archive.display()), e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let dump_name = dump_file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StepError::Archive(format!("bad dump path {}", dump_file.display())))?;

    builder
        .append_path_with_name(dump_file, dump_name)
        .map_err(|e| StepError::archive("cannot add database dump", e))?;
    builder
        .append_dir_all(CONFIG_DIR, config_dir)
        .map_err(|e| StepError::archive("cannot add config directory", e))?;

    builder
        .into_inner()
        .map_err(|e| StepError::archive("cannot finish archive", e))?
        .finish()
        .map_err(|e| StepError::archive("cannot flush archive", e))?;

    Ok(())
}

/// Extract a backup artifact into the workspace.
pub fn unpack_backup(archive: &Path, dest: &Path) -> Result<(), StepError> {
    let file = File::open(archive)
        .map_err(|e| StepError::archive(&format!("cannot open {}", archive.display()), e))?;
    let decoder = GzDecoder::new(file);
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(|e| StepError::archive(&format!("cannot extract {}", archive.display()), e))
}

/// Pack one directory into a plain tar under the given entry name.
pub fn pack_dir(tar_path: &Path, dir: &Path, entry_name: &str) -> Result<(), StepError> {
    let file = File::create(tar_path)
        .map_err(|e| StepError::archive(&format!("cannot create {}", tar_path.display()), e))?;
    let mut builder = tar::Builder::new(file);
    builder
        .append_dir_all(entry_name, dir)
        .map_err(|e| StepError::archive(&format!("cannot add {}", dir.display()), e))?;
    builder
        .finish()
        .map_err(|e| StepError::archive("cannot finish archive", e))
}

/// Extract a plain tar into a directory.
pub fn unpack_tar(tar_path: &Path, dest: &Path) -> Result<(), StepError> {
    let file = File::open(tar_path)
        .map_err(|e| StepError::archive(&format!("cannot open {}", tar_path.display()), e))?;
    tar::Archive::new(file)
        .unpack(dest)
        .map_err(|e| StepError::archive(&format!("cannot extract {}", tar_path.display()), e))
}
