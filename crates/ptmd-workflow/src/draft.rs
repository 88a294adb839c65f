//! 上传草稿
//!
//! 累积患者字段和待上传影像，提交前完成本地校验

use chrono::NaiveDate;
use ptmd_core::{
    ConsultationCreateRequest, ImageFile, NewPatient, Result, Sex, ValidationError,
};
use std::path::Path;

/// 每次会诊最多上传的影像数
pub const MAX_IMAGES: usize = 10;

/// 根据扩展名判断内容类型，仅接受 png/jpg/jpeg
pub fn content_type_for(file_name: &str) -> std::result::Result<&'static str, ValidationError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => Ok("image/png"),
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        _ => Err(ValidationError::UnsupportedImageType(file_name.to_string())),
    }
}

/// 从磁盘读取一张待上传影像
pub async fn read_image_file(path: &Path) -> Result<ImageFile> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let content_type = content_type_for(&file_name)?;
    let bytes = tokio::fs::read(path).await?;

    tracing::debug!("Read image file {} ({} bytes)", file_name, bytes.len());
    Ok(ImageFile {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

/// 一次添加文件的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddFilesOutcome {
    pub accepted: usize,
    pub rejected: usize,
}

/// 新建会诊草稿
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadDraft {
    pub patient_name: String,
    pub patient_cpf: String,
    pub patient_sex: Sex,
    pub patient_birth_date: Option<NaiveDate>,
    images: Vec<ImageFile>,
}

impl UploadDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[ImageFile] {
        &self.images
    }

    /// 追加一批文件，超出上限的部分被拒绝
    pub fn add_files(&mut self, files: Vec<ImageFile>) -> AddFilesOutcome {
        let capacity = MAX_IMAGES.saturating_sub(self.images.len());
        let offered = files.len();
        self.images.extend(files.into_iter().take(capacity));

        let outcome = AddFilesOutcome {
            accepted: offered.min(capacity),
            rejected: offered.saturating_sub(capacity),
        };
        if outcome.rejected > 0 {
            tracing::warn!(
                "Draft image limit {} reached, rejected {} file(s)",
                MAX_IMAGES,
                outcome.rejected
            );
        }
        outcome
    }

    /// 按位置移除一个文件，其余顺序不变
    pub fn remove_file(&mut self, index: usize) -> Option<ImageFile> {
        if index < self.images.len() {
            Some(self.images.remove(index))
        } else {
            None
        }
    }

    /// 校验顺序：影像、姓名、CPF
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.images.is_empty() {
            return Err(ValidationError::MissingImages);
        }
        if self.images.len() > MAX_IMAGES {
            return Err(ValidationError::TooManyImages { limit: MAX_IMAGES });
        }
        if self.patient_name.trim().is_empty() {
            return Err(ValidationError::MissingPatientName);
        }
        if self.patient_cpf.trim().is_empty() {
            return Err(ValidationError::MissingPatientCpf);
        }
        Ok(())
    }

    /// 生成创建请求，仅在校验通过时返回
    pub fn build(&self) -> std::result::Result<ConsultationCreateRequest, ValidationError> {
        self.validate()?;
        Ok(ConsultationCreateRequest {
            patient: NewPatient {
                name: self.patient_name.trim().to_string(),
                cpf: self.patient_cpf.trim().to_string(),
                sex: self.patient_sex,
                birth_date: self.patient_birth_date,
            },
            images: self.images.clone(),
        })
    }

    /// 恢复为空白默认值
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
