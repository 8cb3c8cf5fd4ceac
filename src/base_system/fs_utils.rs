//! 落盘与清理的小工具。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// 先写临时文件再 rename，目标文件要么完整存在，要么不存在。
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ));
    if let Err(err) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    let _ = fs::remove_file(path);
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// 按文件名排序递归列出目录下的所有文件（不含目录本身）。
pub(crate) fn list_files_sorted(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries.into_iter().rev() {
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

pub(crate) fn remove_dir_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        warn!(target: "package", "删除暂存目录失败 {}: {}", path.display(), err);
    }
}
