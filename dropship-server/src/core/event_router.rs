//! Event Router - 事件路由与分发
//!
//! 解耦引擎组件和各个 Worker，提供独立的通道。
//!
//! ```text
//! EventBus (broadcast)
//!        │
//!        └── EventRouter
//!               ├── mpsc ──► InventoryHandler (delivered / cancelled) [CRITICAL]
//!               ├── mpsc ──► SubmissionForwarder (DropshipCreated)     [CRITICAL]
//!               └── mpsc ──► NotificationWorker (all events)           [best-effort]
//! ```
//!
//! ## 优先级策略
//!
//! - **Inventory/Submission**: 关键业务，阻塞发送保证不丢失
//! - **Notification**: Best-effort，满则丢弃（不阻塞关键路径）

use crate::events::EngineEvent;
use shared::models::DropshipStatus;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// 触发库存变动的目标状态
const INVENTORY_STATUSES: &[DropshipStatus] = &[DropshipStatus::Delivered, DropshipStatus::Cancelled];

/// 事件通道集合
pub struct EventChannels {
    pub inventory_rx: mpsc::Receiver<Arc<EngineEvent>>,
    pub submission_rx: mpsc::Receiver<Arc<EngineEvent>>,
    pub notify_rx: mpsc::Receiver<Arc<EngineEvent>>,
}

/// 事件路由器
///
/// 订阅 EventBus 的 broadcast，按类型分发到独立的 mpsc 通道。
pub struct EventRouter {
    inventory_tx: mpsc::Sender<Arc<EngineEvent>>,
    submission_tx: mpsc::Sender<Arc<EngineEvent>>,
    notify_tx: mpsc::Sender<Arc<EngineEvent>>,
}

impl EventRouter {
    /// 创建路由器和通道
    ///
    /// # 参数
    /// - `critical_buffer`: 库存/提交通道 buffer
    /// - `other_buffer`: 通知通道 buffer（best-effort）
    pub fn new(critical_buffer: usize, other_buffer: usize) -> (Self, EventChannels) {
        let (inventory_tx, inventory_rx) = mpsc::channel(critical_buffer);
        let (submission_tx, submission_rx) = mpsc::channel(critical_buffer);
        let (notify_tx, notify_rx) = mpsc::channel(other_buffer);

        (
            Self {
                inventory_tx,
                submission_tx,
                notify_tx,
            },
            EventChannels {
                inventory_rx,
                submission_rx,
                notify_rx,
            },
        )
    }

    /// 运行路由器（阻塞直到源通道关闭）
    pub async fn run(self, mut source: broadcast::Receiver<EngineEvent>) {
        tracing::info!("Event router started");

        loop {
            match source.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::error!(
                        skipped = n,
                        "Event router lagged! Events skipped - stock or submissions may be missed"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event router stopping");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: EngineEvent) {
        let event = Arc::new(event);

        // 1. 库存：阻塞发送
        if let EngineEvent::DropshipStatusChanged { to, .. } = event.as_ref()
            && INVENTORY_STATUSES.contains(to)
            && self.inventory_tx.send(Arc::clone(&event)).await.is_err()
        {
            tracing::error!("Inventory channel closed - stock movement lost!");
        }

        // 2. 提交：阻塞发送
        if matches!(event.as_ref(), EngineEvent::DropshipCreated { .. })
            && self.submission_tx.send(Arc::clone(&event)).await.is_err()
        {
            tracing::error!("Submission channel closed - dropship order not submitted!");
        }

        // 3. 通知：best-effort
        match self.notify_tx.try_send(Arc::clone(&event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event = event.kind(), "Notification channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification channel closed");
            }
        }
    }
}
