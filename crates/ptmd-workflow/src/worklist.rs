//! 会诊列表
//!
//! 列表/详情两个视图共享的会诊状态，以及状态标签和筛选条件

use crate::confirmation::replace_image;
use ptmd_core::utils::non_blank;
use ptmd_core::{Consultation, ConsultationQuery, Image, PtmdError, Result};
use serde::{Deserialize, Serialize};

/// 会诊聚合确认状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStatus {
    pub confirmed_count: usize,
    pub total: usize,
    pub is_fully_confirmed: bool,
}

impl AggregateStatus {
    /// 由影像确认状态计算；没有影像时永远不算全部确认
    pub fn of(consultation: &Consultation) -> Self {
        let total = consultation.images.len();
        let confirmed_count = consultation.images.iter().filter(|img| img.confirmed).count();
        Self {
            confirmed_count,
            total,
            is_fully_confirmed: total > 0 && confirmed_count == total,
        }
    }

    /// 状态标签文本
    pub fn chip_label(&self) -> String {
        if self.is_fully_confirmed {
            "Todas confirmadas".to_string()
        } else {
            format!("{}/{} confirmadas", self.confirmed_count, self.total)
        }
    }
}

/// 会诊列表筛选条件（原始输入）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsultationFilter {
    pub name: String,
    pub cpf: String,
}

impl ConsultationFilter {
    pub fn new(name: impl Into<String>, cpf: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpf: cpf.into(),
        }
    }

    /// 转换为请求参数：去除空白，全空白视为不筛选
    pub fn to_query(&self) -> ConsultationQuery {
        ConsultationQuery {
            name: non_blank(Some(&self.name)),
            cpf: non_blank(Some(&self.cpf)),
        }
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.cpf.clear();
    }
}

/// 列表中一行的展示数据
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsultationRow {
    pub id: i64,
    pub patient_name: String,
    pub patient_cpf: String,
    pub created_at: String,
    pub image_count: String,
    pub status: AggregateStatus,
    pub status_label: String,
}

impl ConsultationRow {
    pub fn from_consultation(consultation: &Consultation) -> Self {
        let status = AggregateStatus::of(consultation);
        Self {
            id: consultation.id,
            patient_name: consultation.patient.name.clone(),
            patient_cpf: consultation.patient.cpf.clone().unwrap_or_default(),
            created_at: consultation
                .created_at
                .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
                .unwrap_or_default(),
            image_count: format!("{} imagem(ns)", consultation.images.len()),
            status,
            status_label: status.chip_label(),
        }
    }
}

/// 会诊看板：列表视图与详情视图持有同一份会诊数据
///
/// 所有更新都来自服务端响应，按 `id` 同时传播到两个视图
#[derive(Debug, Clone, Default)]
pub struct ConsultationBoard {
    consultations: Vec<Consultation>,
    selected: Option<Consultation>,
}

impl ConsultationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consultations(&self) -> &[Consultation] {
        &self.consultations
    }

    pub fn selected(&self) -> Option<&Consultation> {
        self.selected.as_ref()
    }

    pub fn get(&self, consultation_id: i64) -> Option<&Consultation> {
        self.consultations.iter().find(|c| c.id == consultation_id)
    }

    /// 用服务端返回的列表整体替换
    pub fn replace_all(&mut self, consultations: Vec<Consultation>) {
        tracing::debug!("Replacing consultation list with {} entries", consultations.len());
        self.consultations = consultations;
    }

    /// 新建的会诊插入到列表头部，不按日期重新排序
    pub fn prepend(&mut self, consultation: Consultation) {
        self.consultations.insert(0, consultation);
    }

    /// 打开详情视图
    pub fn select(&mut self, consultation: Consultation) {
        self.selected = Some(consultation);
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    /// 用更新后的会诊替换列表和详情中 `id` 相同的条目
    pub fn apply_consultation(&mut self, updated: Consultation) {
        for entry in self.consultations.iter_mut().filter(|c| c.id == updated.id) {
            *entry = updated.clone();
        }
        if let Some(selected) = self.selected.as_mut().filter(|c| c.id == updated.id) {
            *selected = updated;
        }
    }

    /// 把服务端返回的影像写回所属会诊
    ///
    /// 以详情视图中的会诊为基准（存在时），否则以列表中的条目为基准
    pub fn apply_image(&mut self, consultation_id: i64, image: Image) -> Result<Consultation> {
        let base = self
            .selected
            .as_ref()
            .filter(|c| c.id == consultation_id)
            .or_else(|| self.get(consultation_id))
            .ok_or_else(|| {
                PtmdError::NotFound(format!("Consultation {} not found", consultation_id))
            })?;

        let updated = replace_image(base, image)?;
        self.apply_consultation(updated.clone());
        Ok(updated)
    }

    /// 列表展示行
    pub fn rows(&self) -> Vec<ConsultationRow> {
        self.consultations.iter().map(ConsultationRow::from_consultation).collect()
    }
}
