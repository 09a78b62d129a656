//! 工具模块
//!
//! - [`logger`] - 日志初始化与清理
//! - 统一错误/响应类型 (from shared::error)

pub mod logger;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
