//! 核心模块 - 配置、状态、错误和后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 服务器配置
//! - [`ServerState`] - 引擎组件的共享状态
//! - [`EngineError`] - 引擎错误分类
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod error;
pub mod event_router;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use state::{QueueWorkers, Queues, ServerState};
pub use tasks::{BackgroundTasks, TaskKind};
