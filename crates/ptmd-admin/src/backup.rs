//! 数据库备份落盘

use chrono::{DateTime, NaiveDate, Utc};
use ptmd_core::{PtmdError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// 备份归档文件名：`ptmd_database_YYYY-MM-DD.zip`
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("ptmd_database_{}.zip", date.format("%Y-%m-%d"))
}

/// 已写入的备份归档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256十六进制摘要
    pub sha256: String,
    pub written_at: DateTime<Utc>,
}

/// 把备份字节写入 `output_dir`，同名文件会被覆盖
pub async fn write_backup(output_dir: &Path, date: NaiveDate, data: &[u8]) -> Result<BackupReceipt> {
    if data.is_empty() {
        return Err(PtmdError::NotFound("backup archive is empty".to_string()));
    }

    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(backup_file_name(date));
    tokio::fs::write(&path, data).await?;

    let receipt = BackupReceipt {
        path,
        size_bytes: data.len() as u64,
        sha256: calculate_hash(data),
        written_at: Utc::now(),
    };
    info!(
        "Backup written to {} ({} bytes, sha256 {})",
        receipt.path.display(),
        receipt.size_bytes,
        receipt.sha256
    );
    Ok(receipt)
}

fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(backup_file_name(date), "ptmd_database_2024-03-07.zip");
    }

    #[tokio::test]
    async fn test_write_backup_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("backups");
        let date = NaiveDate::from_ymd_opt(2024, 10, 30).unwrap();

        let receipt = write_backup(&out, date, b"abc").await.unwrap();
        assert_eq!(receipt.path, out.join("ptmd_database_2024-10-30.zip"));
        assert_eq!(receipt.size_bytes, 3);
        assert_eq!(
            receipt.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(std::fs::read(&receipt.path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_empty_backup_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 10, 30).unwrap();
        assert!(write_backup(dir.path(), date, &[]).await.is_err());
    }
}
