//! # PTMD Core
//!
//! PTMD耳镜影像分诊客户端的核心模块，提供诊断词表、数据结构、错误定义、
//! 后端接口抽象和通用工具。

pub mod api;
pub mod diagnosis;
pub mod error;
pub mod models;
pub mod utils;

pub use api::{AdminApi, AuthApi, ConsultationApi, ConsultationQuery};
pub use diagnosis::Diagnosis;
pub use error::{PtmdError, Result, ValidationError};
pub use models::*;
