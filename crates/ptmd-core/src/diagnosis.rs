//! 诊断词表
//!
//! 封闭的耳部诊断集合，以及把上游AI自由文本映射到该集合的规则

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 诊断代码
///
/// JSON中的取值与后端枚举的 `@JsonValue` 完全一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Diagnosis {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "aom")]
    Aom,
    #[serde(rename = "csom")]
    Csom,
    #[serde(rename = "earwax")]
    Earwax,
    #[serde(rename = "ExternalEarInfections")]
    ExternalEarInfections,
    #[serde(rename = "tympanoskleros")]
    Tympanoskleros,
}

impl Diagnosis {
    /// 全部诊断，按下拉框的展示顺序
    pub const ALL: [Diagnosis; 6] = [
        Diagnosis::Normal,
        Diagnosis::Aom,
        Diagnosis::Csom,
        Diagnosis::Earwax,
        Diagnosis::ExternalEarInfections,
        Diagnosis::Tympanoskleros,
    ];

    /// 线上传输代码
    pub fn code(&self) -> &'static str {
        match self {
            Diagnosis::Normal => "Normal",
            Diagnosis::Aom => "aom",
            Diagnosis::Csom => "csom",
            Diagnosis::Earwax => "earwax",
            Diagnosis::ExternalEarInfections => "ExternalEarInfections",
            Diagnosis::Tympanoskleros => "tympanoskleros",
        }
    }

    /// 显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Diagnosis::Normal => "Normal",
            Diagnosis::Aom => "Otite Média Aguda (AOM)",
            Diagnosis::Csom => "Otite Média Crônica (CSOM)",
            Diagnosis::Earwax => "Cerúmen",
            Diagnosis::ExternalEarInfections => "Infecções do Ouvido Externo",
            Diagnosis::Tympanoskleros => "Timpanoesclerose",
        }
    }

    /// 精确匹配线上代码
    pub fn from_code(code: &str) -> Option<Diagnosis> {
        Self::ALL.iter().copied().find(|d| d.code() == code)
    }

    /// 把上游AI的任意字符串映射到诊断
    ///
    /// 无法识别的输入一律返回 `Normal`，临床医生看到的默认选项依赖这一点
    pub fn normalize(raw: &str) -> Diagnosis {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "normal" => Diagnosis::Normal,
            "aom" => Diagnosis::Aom,
            "csom" => Diagnosis::Csom,
            "earwax" => Diagnosis::Earwax,
            "externalearinfections" => Diagnosis::ExternalEarInfections,
            "tympanoskleros" => Diagnosis::Tympanoskleros,
            other if other.contains("external") => Diagnosis::ExternalEarInfections,
            _ => Diagnosis::Normal,
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 解析用户输入：接受线上代码或变体名（大小写不敏感）
impl FromStr for Diagnosis {
    type Err = ValidationError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Some(d) = Self::ALL.iter().find(|d| d.code().eq_ignore_ascii_case(trimmed)) {
            return Ok(*d);
        }

        let variant = trimmed.to_uppercase().replace('-', "_");
        match variant.as_str() {
            "NORMAL" => Ok(Diagnosis::Normal),
            "AOM" => Ok(Diagnosis::Aom),
            "CSOM" => Ok(Diagnosis::Csom),
            "EARWAX" => Ok(Diagnosis::Earwax),
            "EXTERNAL_EAR_INFECTIONS" => Ok(Diagnosis::ExternalEarInfections),
            "TYMPANOSKLEROS" => Ok(Diagnosis::Tympanoskleros),
            _ => Err(ValidationError::InvalidDiagnosis(value.to_string())),
        }
    }
}
