use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, EngineResult};
use crate::decomposition::Decomposer;
use crate::dispatch::transport::FtpConnector;
use crate::dispatch::{Dispatcher, SubmissionJob, SupplierLocks, TransportContext};
use crate::events::{EngineEvent, EventBus, EventChannels, EventRouter};
use crate::inventory::InventoryHandler;
use crate::lifecycle::DropshipLifecycle;
use crate::notify::{NotificationWorker, Notifier};
use crate::pricing::{PriceService, PricingJob};
use crate::queue::{QueueHandle, QueueName, TaskQueue};
use crate::retry::{RetryEngine, RetryJob, SubmissionHandler};
use crate::storage::EngineStorage;
use crate::sync::{SyncEngine, SyncJob};
use crate::webhook::{WebhookIngestor, WebhookJob};

/// 任务队列发送端
#[derive(Clone)]
pub struct Queues {
    pub submission: QueueHandle<SubmissionJob>,
    pub webhooks: QueueHandle<WebhookJob>,
    pub retry: QueueHandle<RetryJob>,
    pub sync: QueueHandle<SyncJob>,
    pub pricing: QueueHandle<PricingJob>,
}

/// 任务队列接收端，交给 [`ServerState::start_background`] 消费
pub struct QueueWorkers {
    submission: TaskQueue<SubmissionJob>,
    webhooks: TaskQueue<WebhookJob>,
    retry: TaskQueue<RetryJob>,
    sync: TaskQueue<SyncJob>,
    pricing: TaskQueue<PricingJob>,
}

/// 服务器状态 - 持有所有引擎组件的共享引用
///
/// 所有组件内部都是 Arc/句柄，Clone 成本极低，可直接作为 axum 的 State。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | redb 存储 |
/// | events | 引擎事件总线 |
/// | lifecycle | DropshipOrder 状态机 (CAS 写入 + 父订单聚合) |
/// | decomposer | 订单拆分 |
/// | dispatcher | 供应商提交 |
/// | retry | 重试与恢复 |
/// | sync | 目录同步 |
/// | pricing | 价格传播与审批 |
/// | webhooks | Webhook 验签与处理 |
/// | queues | 五个命名队列的发送端 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: EngineStorage,
    pub events: EventBus,
    pub lifecycle: DropshipLifecycle,
    pub decomposer: Decomposer,
    pub dispatcher: Dispatcher,
    pub retry: RetryEngine,
    pub sync: Arc<SyncEngine>,
    pub pricing: Arc<PriceService>,
    pub webhooks: Arc<WebhookIngestor>,
    pub queues: Queues,
    notifier: Arc<dyn Notifier>,
}

impl ServerState {
    /// 组装引擎
    ///
    /// 外部协作方 (FTP、邮件) 由调用方注入，测试中替换为内存实现。
    pub fn new(
        config: Config,
        storage: EngineStorage,
        ftp: Arc<dyn FtpConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> EngineResult<(Self, QueueWorkers)> {
        let events = EventBus::default();
        let locks = SupplierLocks::new();
        let lifecycle = DropshipLifecycle::new(storage.clone(), events.clone());

        let (submission_tx, submission) = TaskQueue::new(QueueName::Submission, &config.queue);
        let (webhooks_tx, webhooks) = TaskQueue::new(QueueName::Webhooks, &config.queue);
        let (retry_tx, retry_queue) = TaskQueue::new(QueueName::Retry, &config.queue);
        let (sync_tx, sync_queue) = TaskQueue::new(QueueName::Sync, &config.queue);
        let (pricing_tx, pricing_queue) = TaskQueue::new(QueueName::Pricing, &config.queue);

        let transports = TransportContext::new(config.http_timeout(), ftp.clone(), notifier.clone())?;
        let dispatcher = Dispatcher::new(
            storage.clone(),
            lifecycle.clone(),
            events.clone(),
            locks.clone(),
            transports,
        );
        let retry = RetryEngine::new(
            storage.clone(),
            lifecycle.clone(),
            events.clone(),
            dispatcher.clone(),
            config.retry.clone(),
        )
        .with_queue(retry_tx.clone());
        let sync = SyncEngine::new(
            storage.clone(),
            events.clone(),
            locks.clone(),
            config.bulk_http_timeout(),
            ftp,
            config.http_timeout(),
            config.pricing.clone(),
            config.sync.clone(),
        )?;
        let pricing = PriceService::new(storage.clone(), events.clone(), config.pricing.clone());
        let webhooks_ingestor = WebhookIngestor::new(
            storage.clone(),
            lifecycle.clone(),
            events.clone(),
            locks,
            config.pricing.clone(),
        );

        let state = Self {
            decomposer: Decomposer::new(storage.clone(), events.clone()),
            config,
            storage,
            events,
            lifecycle,
            dispatcher,
            retry,
            sync: Arc::new(sync),
            pricing: Arc::new(pricing),
            webhooks: Arc::new(webhooks_ingestor),
            queues: Queues {
                submission: submission_tx,
                webhooks: webhooks_tx,
                retry: retry_tx,
                sync: sync_tx,
                pricing: pricing_tx,
            },
            notifier,
        };
        let workers = QueueWorkers {
            submission,
            webhooks,
            retry: retry_queue,
            sync: sync_queue,
            pricing: pricing_queue,
        };
        Ok((state, workers))
    }

    /// 启动后台任务
    ///
    /// - Worker: 五个队列消费者
    /// - Listener: 事件路由、库存、通知、提交转发
    /// - Periodic: 卡单扫描、目录同步
    pub fn start_background(&self, workers: QueueWorkers, tasks: &mut BackgroundTasks) {
        let token = tasks.shutdown_token();

        // ========== Queue workers ==========
        let submission_handler = Arc::new(SubmissionHandler::new(
            self.dispatcher.clone(),
            self.retry.clone(),
        ));
        tasks.spawn(
            "submission_queue",
            TaskKind::Worker,
            workers.submission.run(submission_handler, token.clone()),
        );
        tasks.spawn(
            "webhooks_queue",
            TaskKind::Worker,
            workers.webhooks.run(self.webhooks.clone(), token.clone()),
        );
        tasks.spawn(
            "retry_queue",
            TaskKind::Worker,
            workers.retry.run(Arc::new(self.retry.clone()), token.clone()),
        );
        tasks.spawn(
            "sync_queue",
            TaskKind::Worker,
            workers.sync.run(self.sync.clone(), token.clone()),
        );
        tasks.spawn(
            "pricing_queue",
            TaskKind::Worker,
            workers.pricing.run(self.pricing.clone(), token.clone()),
        );

        // ========== Event listeners ==========
        let (router, channels) = EventRouter::new(1024, 256);
        let EventChannels {
            inventory_rx,
            submission_rx,
            notify_rx,
        } = channels;
        let source = self.events.subscribe();
        let router_token = token.clone();
        tasks.spawn("event_router", TaskKind::Listener, async move {
            tokio::select! {
                _ = router_token.cancelled() => {}
                _ = router.run(source) => {}
            }
        });
        tasks.spawn(
            "inventory_handler",
            TaskKind::Listener,
            InventoryHandler::new(self.storage.clone()).run(inventory_rx, token.clone()),
        );
        tasks.spawn(
            "notification_worker",
            TaskKind::Listener,
            NotificationWorker::new(
                self.storage.clone(),
                self.notifier.clone(),
                self.config.admin_email.clone(),
            )
            .run(notify_rx, token.clone()),
        );
        tasks.spawn(
            "submission_forwarder",
            TaskKind::Listener,
            forward_created(submission_rx, self.queues.submission.clone(), token),
        );

        // ========== Periodic ==========
        let retry = self.retry.clone();
        let retry_queue = self.queues.retry.clone();
        tasks.spawn_periodic(
            "retry_sweep",
            Duration::from_secs(self.config.retry_scan.interval_secs),
            move || {
                let retry = retry.clone();
                let queue = retry_queue.clone();
                async move {
                    let due = match retry.sweep(shared::util::now_millis()).await {
                        Ok(due) => due,
                        Err(e) => {
                            tracing::error!(error = %e, "Retry sweep failed");
                            return;
                        }
                    };
                    for dropship_order_id in due {
                        if let Err(e) = queue.enqueue(RetryJob { dropship_order_id }).await {
                            tracing::error!(dropship_order_id, error = %e, "Failed to enqueue retry");
                        }
                    }
                }
            },
        );

        let sync = self.sync.clone();
        let sync_queue = self.queues.sync.clone();
        tasks.spawn_periodic(
            "catalog_sync",
            Duration::from_secs(self.config.sync.interval_secs),
            move || {
                let sync = sync.clone();
                let queue = sync_queue.clone();
                async move {
                    let suppliers = match sync.syncable_suppliers() {
                        Ok(ids) => ids,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to list syncable suppliers");
                            return;
                        }
                    };
                    for supplier_id in suppliers {
                        if let Err(e) = queue.enqueue(SyncJob { supplier_id }).await {
                            tracing::error!(supplier_id, error = %e, "Failed to enqueue sync");
                        }
                    }
                }
            },
        );
    }
}

/// DropshipCreated → submission 队列
async fn forward_created(
    mut rx: tokio::sync::mpsc::Receiver<Arc<EngineEvent>>,
    queue: QueueHandle<SubmissionJob>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if let EngineEvent::DropshipCreated {
            dropship_order_id, ..
        } = event.as_ref()
            && let Err(e) = queue
                .enqueue(SubmissionJob {
                    dropship_order_id: *dropship_order_id,
                })
                .await
        {
            tracing::error!(
                dropship_order_id = *dropship_order_id,
                error = %e,
                "Failed to enqueue submission"
            );
        }
    }
}
