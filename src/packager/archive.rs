//! 把暂存目录原样压缩为 zip/cbz。

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::base_system::fs_utils::list_files_sorted;
use crate::download::error::DownloadError;

/// 递归压缩 `src` 下的所有文件到 `dest`，条目名为相对路径（`/` 分隔）。
///
/// 失败时删除写了一半的压缩包。
pub(crate) fn zip_dir(src: &Path, dest: &Path) -> Result<(), DownloadError> {
    write_zip(src, dest).inspect_err(|_| {
        let _ = fs::remove_file(dest);
    })
}

fn write_zip(src: &Path, dest: &Path) -> Result<(), DownloadError> {
    let files = list_files_sorted(src).map_err(|e| DownloadError::packaging(src.display(), e))?;
    let out = File::create(dest).map_err(|e| DownloadError::packaging(dest.display(), e))?;
    let mut zip = zip::ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let rel = file
            .strip_prefix(src)
            .map_err(|e| DownloadError::packaging(file.display(), e))?;
        let name = rel.to_string_lossy().replace('\\', "/");
        zip.start_file(name, options)
            .map_err(|e| DownloadError::packaging(dest.display(), e))?;
        let mut reader = File::open(&file).map_err(|e| DownloadError::packaging(file.display(), e))?;
        io::copy(&mut reader, &mut zip).map_err(|e| DownloadError::packaging(file.display(), e))?;
    }
    zip.finish()
        .map_err(|e| DownloadError::packaging(dest.display(), e))?;
    Ok(())
}
