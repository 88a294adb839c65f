//! 诊断确认协调器
//!
//! 决定未确认影像预选的诊断，并以写时复制的方式应用确认结果

use ptmd_core::{Consultation, Diagnosis, Image, PtmdError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 影像确认状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageState {
    Unconfirmed,
    Confirmed,
}

impl ImageState {
    pub fn of(image: &Image) -> Self {
        if image.confirmed {
            ImageState::Confirmed
        } else {
            ImageState::Unconfirmed
        }
    }
}

/// 影像状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageEvent {
    Confirm,
}

/// 影像确认状态机
///
/// 确认是终态：`Confirmed` 上没有任何合法事件
#[derive(Debug)]
pub struct ConfirmationStateMachine {
    transitions: HashMap<(ImageState, ImageEvent), ImageState>,
}

impl ConfirmationStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();
        transitions.insert((ImageState::Unconfirmed, ImageEvent::Confirm), ImageState::Confirmed);
        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: ImageState, event: ImageEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: ImageState, event: ImageEvent) -> Result<ImageState> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(PtmdError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for ConfirmationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前应预选的诊断
///
/// 优先级：已有最终诊断 > AI建议 > `Normal`
pub fn current_selection(image: &Image) -> Diagnosis {
    // 空字符串视为未设置
    let final_diagnosis = image.final_diagnosis.as_deref().filter(|f| !f.trim().is_empty());
    if let Some(final_diagnosis) = final_diagnosis {
        return Diagnosis::from_code(final_diagnosis)
            .unwrap_or_else(|| Diagnosis::normalize(final_diagnosis));
    }
    match image.ai_diagnosis.as_deref() {
        Some(ai) => Diagnosis::normalize(ai),
        None => Diagnosis::Normal,
    }
}

/// 应用确认决定，返回新的影像
///
/// 不再校验 `confirmed`，重复确认会覆盖旧值；是否允许由后端决定
pub fn confirm(image: &Image, chosen: Diagnosis) -> Image {
    Image {
        final_diagnosis: Some(chosen.code().to_string()),
        confirmed: true,
        ..image.clone()
    }
}

/// 按 `id` 替换会诊中的一张影像，保持顺序和其他影像不变
pub fn replace_image(consultation: &Consultation, updated: Image) -> Result<Consultation> {
    if consultation.image(updated.id).is_none() {
        return Err(PtmdError::NotFound(format!(
            "Image {} not found in consultation {}",
            updated.id, consultation.id
        )));
    }

    let images = consultation
        .images
        .iter()
        .map(|img| if img.id == updated.id { updated.clone() } else { img.clone() })
        .collect();

    Ok(Consultation {
        images,
        ..consultation.clone()
    })
}
