//! 원자적 파일 쓰기
//!
//! 같은 디렉토리에 `<file>.tmp`를 쓰고 fsync 한 뒤 정식 파일 이름으로 rename 한다.
//! 쓰는 도중에 프로세스가 죽어도 정식 파일은 항상 이전 내용 또는 새 내용 중 하나다.

use crate::{Error, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// `path`에 대응하는 임시 파일 경로 (`state.json` -> `state.json.tmp`)
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// 비동기 원자적 쓰기
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::store_io(parent, e))?;
    }

    let tmp = temp_path_for(path);
    {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| Error::store_io(&tmp, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| Error::store_io(&tmp, e))?;
        file.sync_all().await.map_err(|e| Error::store_io(&tmp, e))?;
    }

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::store_io(path, e))
}

/// 동기 원자적 쓰기 (설정 파일 등)
pub fn write_atomic_sync(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::store_io(parent, e))?;
    }

    let tmp = temp_path_for(path);
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| Error::store_io(&tmp, e))?;
        file.write_all(contents)
            .map_err(|e| Error::store_io(&tmp, e))?;
        file.sync_all().map_err(|e| Error::store_io(&tmp, e))?;
    }

    std::fs::rename(&tmp, path).map_err(|e| Error::store_io(path, e))
}
