//! Dropship Server - 代发货订单编排引擎
//!
//! # 架构概述
//!
//! 已支付订单按供应商拆分为子订单 (DropshipOrder)，经 API / Webhook / FTP /
//! Email 提交给供应商，通过供应商 Webhook 与定时同步回收状态、价格和库存，
//! 并把子订单状态聚合回父订单。
//!
//! ```text
//! dropship-server/src/
//! ├── core/           # 配置、状态、错误、事件路由、后台任务
//! ├── storage/        # redb 存储
//! ├── decomposition   # 订单拆分
//! ├── dispatch/       # 供应商提交 (api / webhook / ftp / email)
//! ├── webhook/        # Webhook 验签与处理
//! ├── retry/          # 重试与恢复
//! ├── sync/           # 目录同步
//! ├── pricing/        # 价格传播与审批
//! ├── aggregator/     # 父订单状态聚合
//! ├── lifecycle       # 子订单状态机
//! ├── queue           # 命名任务队列
//! ├── inventory       # 库存变动
//! ├── notify          # 通知
//! ├── api/            # HTTP 路由和处理器
//! └── utils/          # 日志等工具
//! ```

pub mod aggregator;
pub mod api;
pub mod core;
pub mod decomposition;
pub mod dispatch;
pub mod events;
pub mod inventory;
pub mod lifecycle;
pub mod notify;
pub mod pricing;
pub mod queue;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export 公共类型
pub use core::{BackgroundTasks, Config, EngineError, EngineResult, ServerState};
pub use storage::EngineStorage;
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};
