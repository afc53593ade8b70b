pub mod command;
pub mod common;
pub mod error;
pub mod pack;
pub mod ply;
pub mod sort;
pub mod transform;
mod structures;

use error::SplatError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub use structures::{PointCloud, SplatRecord, Vertex, SPLAT_RECORD_SIZE};
pub use transform::DegenerateRotation;

pub const SPLAT_EXTENSION: &str = "splat";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub degenerate_rotation: DegenerateRotation,
}

/// Converts a splat PLY into `.splat` bytes, written to `output`.
///
/// `output` is only touched once the whole conversion has succeeded.
pub fn convert(
    raw_data: &[u8],
    options: &ConvertOptions,
    output: &mut Vec<u8>,
) -> Result<(), SplatError> {
    let cloud = ply::read_point_cloud(raw_data)?;
    let order = sort::priority_order(&cloud.vertices);
    let records = transform::transform_sorted(&cloud, &order, options.degenerate_rotation)?;
    pack::pack_records(&records, output);
    tracing::debug!(splats = records.len(), bytes = output.len(), "Converted point cloud");
    Ok(())
}

/// `scene.ply` becomes `scene.splat`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(SPLAT_EXTENSION)
}

/// Writes `data` to `path` through a temporary file in the same directory,
/// so `path` ends up either fully written or untouched.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), SplatError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| SplatError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| SplatError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| SplatError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| SplatError::io(path, e.error))?;
    Ok(())
}

/// Reads `input`, converts it and atomically writes the result to `output`.
/// Returns the number of splats written.
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<usize, SplatError> {
    let raw_data = std::fs::read(input).map_err(|e| SplatError::io(input, e))?;
    let mut buf = Vec::new();
    convert(&raw_data, options, &mut buf)?;
    write_atomic(output, &buf)?;
    tracing::info!(
        "Wrote {} splats to '{}'",
        buf.len() / SPLAT_RECORD_SIZE,
        output.display()
    );
    Ok(buf.len() / SPLAT_RECORD_SIZE)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    async fn spawn_blocking<T, F>(f: F) -> Result<T, SplatError>
    where
        F: FnOnce() -> Result<T, SplatError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| SplatError::Task(e.to_string()))?
    }

    #[inline(never)]
    pub async fn convert_async(
        raw_data: Vec<u8>,
        options: ConvertOptions,
    ) -> Result<Vec<u8>, SplatError> {
        spawn_blocking(move || {
            let mut buf = Vec::new();
            convert(&raw_data, &options, &mut buf)?;
            Ok(buf)
        })
        .await
    }

    #[inline(never)]
    pub async fn convert_file_async(
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<usize, SplatError> {
        let raw_data = tokio::fs::read(input)
            .await
            .map_err(|e| SplatError::io(input, e))?;
        let buf = convert_async(raw_data, *options).await?;
        let count = buf.len() / SPLAT_RECORD_SIZE;

        let output_path = output.to_path_buf();
        spawn_blocking(move || write_atomic(&output_path, &buf)).await?;
        tracing::info!("Wrote {} splats to '{}'", count, output.display());
        Ok(count)
    }
}
}
