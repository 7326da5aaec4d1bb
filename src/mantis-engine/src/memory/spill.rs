//! On-disk matrix format shared by spill files and job datasets.
//!
//! A matrix is stored as `<name>.bin`, the row-major cells as little-endian
//! `f64`, next to a `<name>.meta.json` sidecar holding its characteristics.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use common_error::{MantisError, MantisResult};
use mantis_core::{MatrixBlock, MatrixCharacteristics, ValueType};
use serde::{Deserialize, Serialize};

/// Sidecar metadata of a stored matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub chars: MatrixCharacteristics,
    pub value_type: ValueType,
}

/// Sidecar path of the cell file at `path`.
pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

/// Write `block` to `path` and its sidecar. Blocking sizes are taken from `chars`.
pub fn write_block(
    path: &Path,
    block: &MatrixBlock,
    chars: &MatrixCharacteristics,
    value_type: ValueType,
) -> MantisResult<BlockMeta> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    for v in block.values() {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()?;

    let meta = BlockMeta {
        chars: chars
            .with_dims(block.rows() as i64, block.cols() as i64)
            .with_nnz(block.nnz() as i64),
        value_type,
    };
    let sidecar = BufWriter::new(File::create(meta_path(path))?);
    serde_json::to_writer_pretty(sidecar, &meta)?;
    Ok(meta)
}

/// Read a block written by [`write_block`].
pub fn read_block(path: &Path) -> MantisResult<(MatrixBlock, BlockMeta)> {
    let meta: BlockMeta = serde_json::from_slice(&fs::read(meta_path(path))?)?;
    let (rows, cols) = (meta.chars.rows, meta.chars.cols);
    if rows < 0 || cols < 0 {
        return Err(MantisError::internal(format!(
            "{} has unknown dimensions",
            path.display()
        )));
    }
    let bytes = fs::read(path)?;
    let expected = rows as usize * cols as usize * 8;
    if bytes.len() != expected {
        return Err(std::io::Error::new(
            IoErrorKind::InvalidData,
            format!(
                "{}: expected {expected} bytes for {rows} x {cols}, found {}",
                path.display(),
                bytes.len()
            ),
        )
        .into());
    }
    let values = bytes
        .chunks_exact(8)
        .map(|c| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(c);
            f64::from_le_bytes(buf)
        })
        .collect();
    Ok((MatrixBlock::from_vec(rows as usize, cols as usize, values)?, meta))
}

/// Remove a stored block and its sidecar. Missing files are ignored.
pub fn remove_block(path: &Path) -> MantisResult<()> {
    for p in [path.to_path_buf(), meta_path(path)] {
        match fs::remove_file(&p) {
            Err(e) if e.kind() != IoErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("obj_1.bin");
        let block = MatrixBlock::from_rows(&[
            vec![0.1 + 0.2, -0.0, f64::MIN_POSITIVE],
            vec![f64::NAN, f64::INFINITY, 1e300],
        ])
        .unwrap();
        let chars = MatrixCharacteristics::new(2, 3, 1000, 1000);
        let meta = write_block(&path, &block, &chars, ValueType::Double).unwrap();
        assert_eq!(meta.chars.nnz, 5);
        assert!(meta_path(&path).exists());

        let (read, read_meta) = read_block(&path).unwrap();
        assert!(read.bit_eq(&block));
        assert_eq!(read_meta, meta);

        remove_block(&path).unwrap();
        assert!(!path.exists());
        remove_block(&path).unwrap();
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj_2.bin");
        let block = MatrixBlock::filled(2, 2, 1.5);
        write_block(&path, &block, &MatrixCharacteristics::unknown(), ValueType::Double).unwrap();
        fs::write(&path, [0u8; 12]).unwrap();
        assert!(matches!(read_block(&path), Err(MantisError::IoError(_))));
    }
}
