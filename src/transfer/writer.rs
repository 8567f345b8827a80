use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::TransferError;

/// 按偏移量写入数据块
pub struct ChunkWriter {
    file: File,
    path: PathBuf,
}

impl ChunkWriter {
    /// 不支持断点续传，已有文件会被截断
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        Ok(Self { file, path })
    }

    pub async fn write_chunk(&mut self, data: &[u8], offset: u64) -> Result<(), TransferError> {
        if data.is_empty() {
            return Err(TransferError::InvalidChunk);
        }
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<PathBuf, TransferError> {
        self.file.flush().await?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dlbridge-{}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn writes_at_offsets() {
        let path = scratch_path("chunks.bin");
        let mut writer = ChunkWriter::create(&path).await.unwrap();
        writer.write_chunk(b"world", 5).await.unwrap();
        writer.write_chunk(b"hello", 0).await.unwrap();
        let path = writer.finish().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"helloworld");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn rejects_empty_chunk() {
        let path = scratch_path("empty.bin");
        let mut writer = ChunkWriter::create(&path).await.unwrap();
        assert!(matches!(
            writer.write_chunk(&[], 0).await,
            Err(TransferError::InvalidChunk)
        ));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn create_truncates_previous_file() {
        let path = scratch_path("nested/old.bin");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"stale content from last run").await.unwrap();

        let mut writer = ChunkWriter::create(&path).await.unwrap();
        writer.write_chunk(b"new", 0).await.unwrap();
        let path = writer.finish().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
