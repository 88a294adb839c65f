//! # PTMD工作流模块
//!
//! 医生端的诊断确认工作流，包括：
//! - 确认协调器：AI建议、预选诊断与确认结果的一致性
//! - 会诊列表：聚合确认状态、筛选条件、列表与详情视图的同步
//! - 上传草稿：患者字段与最多10张影像的本地校验
//! - 工作流引擎：在途请求约束与错误横幅

pub mod confirmation;
pub mod draft;
pub mod engine;
pub mod worklist;

// 重新导出主要类型
pub use confirmation::{
    confirm, current_selection, replace_image, ConfirmationStateMachine, ImageEvent, ImageState,
};
pub use draft::{read_image_file, AddFilesOutcome, UploadDraft, MAX_IMAGES};
pub use engine::{MedicoWorkflow, WorkflowState};
pub use worklist::{AggregateStatus, ConsultationBoard, ConsultationFilter, ConsultationRow};
