//! 事件总线
//!
//! 同步的发布-订阅机制。发布时按订阅顺序依次调用当前订阅者的快照，
//! 调用期间不持有任何锁，因此回调内可以再次订阅、取消订阅或发布事件。
//! 单个回调 panic 会被捕获并记录，不影响其余订阅者，也不会传播给发布者。
//!
//! # 使用示例
//!
//! ```rust
//! use module_framework::event::{EventBus, EventPayload};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let handle = bus.subscribe("dock:ready", Arc::new(|event| {
//!     println!("收到事件: {:?}", event.payload);
//! }));
//!
//! assert_eq!(bus.publish("dock:ready", EventPayload::Custom(serde_json::json!({}))), 1);
//! assert!(handle.unsubscribe());
//! assert!(!handle.unsubscribe());
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::event::payload::{Event, EventPayload};
use crate::utils::generate_subscription_id;

/// 事件回调函数类型
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

type SubscriptionMap = RwLock<HashMap<String, Vec<SubscriptionEntry>>>;

#[derive(Clone)]
struct SubscriptionEntry {
    subscription_id: String,
    callback: EventCallback,
}

/// 分发统计信息
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// 发布次数
    pub published: u64,

    /// 成功调用的回调次数
    pub delivered: u64,

    /// panic 的回调次数
    pub failed: u64,

    /// 最后分发时间
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// 订阅句柄
///
/// 通过 [`SubscriptionHandle::unsubscribe`] 移除对应的回调。句柄只弱引用
/// 事件总线，不会延长其生命周期。
#[derive(Clone)]
pub struct SubscriptionHandle {
    subscription_id: String,
    event_name: String,
    subscriptions: Weak<SubscriptionMap>,
}

impl SubscriptionHandle {
    /// 订阅 ID
    pub fn id(&self) -> &str {
        &self.subscription_id
    }

    /// 订阅的事件名
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// 取消订阅
    ///
    /// 幂等：只有第一次调用会移除回调并返回 `true`。
    pub fn unsubscribe(&self) -> bool {
        match self.subscriptions.upgrade() {
            Some(subscriptions) => {
                remove_subscription(&subscriptions, &self.event_name, &self.subscription_id)
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("subscription_id", &self.subscription_id)
            .field("event_name", &self.event_name)
            .finish()
    }
}

fn remove_subscription(subscriptions: &SubscriptionMap, event_name: &str, subscription_id: &str) -> bool {
    let mut subscriptions = subscriptions.write();
    let Some(entries) = subscriptions.get_mut(event_name) else {
        return false;
    };

    let before = entries.len();
    entries.retain(|e| e.subscription_id != subscription_id);
    let removed = entries.len() != before;
    if entries.is_empty() {
        subscriptions.remove(event_name);
    }

    if removed {
        debug!(subscription_id = %subscription_id, event_name = %event_name, "取消订阅成功");
    }
    removed
}

/// 事件总线
///
/// 克隆得到的实例共享同一组订阅。
#[derive(Clone, Default)]
pub struct EventBus {
    /// 订阅列表：事件名 -> 按订阅顺序排列的条目
    subscriptions: Arc<SubscriptionMap>,

    /// 分发统计
    stats: Arc<Mutex<DispatchStats>>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅事件
    ///
    /// # Returns
    ///
    /// 返回订阅句柄，用于取消订阅
    pub fn subscribe(&self, event_name: impl Into<String>, callback: EventCallback) -> SubscriptionHandle {
        let event_name = event_name.into();
        let subscription_id = generate_subscription_id();

        self.subscriptions
            .write()
            .entry(event_name.clone())
            .or_default()
            .push(SubscriptionEntry {
                subscription_id: subscription_id.clone(),
                callback,
            });

        debug!(subscription_id = %subscription_id, event_name = %event_name, "事件订阅成功");

        SubscriptionHandle {
            subscription_id,
            event_name,
            subscriptions: Arc::downgrade(&self.subscriptions),
        }
    }

    /// 按订阅 ID 取消订阅
    pub fn unsubscribe(&self, event_name: &str, subscription_id: &str) -> bool {
        remove_subscription(&self.subscriptions, event_name, subscription_id)
    }

    /// 发布事件
    ///
    /// # Returns
    ///
    /// 返回被调用的订阅者数量（包括 panic 的订阅者）
    pub fn publish(&self, event_name: impl Into<String>, payload: EventPayload) -> usize {
        self.dispatch(Event::new(event_name, payload))
    }

    /// 分发一个已构造的事件
    pub fn dispatch(&self, event: Event) -> usize {
        let snapshot: Vec<SubscriptionEntry> = self
            .subscriptions
            .read()
            .get(&event.name)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            trace!(event_id = %event.event_id, event_name = %event.name, "没有订阅者");
            self.record(0, 0);
            return 0;
        }

        let mut failed = 0usize;
        for entry in &snapshot {
            let callback = entry.callback.clone();
            let event_clone = event.clone();
            if catch_unwind(AssertUnwindSafe(move || callback(event_clone))).is_err() {
                failed += 1;
                warn!(
                    subscription_id = %entry.subscription_id,
                    event_name = %event.name,
                    "事件回调 panic，已隔离"
                );
            }
        }

        self.record(snapshot.len() - failed, failed);
        trace!(
            event_id = %event.event_id,
            event_name = %event.name,
            subscribers = snapshot.len(),
            failed = failed,
            "事件分发完成"
        );

        snapshot.len()
    }

    fn record(&self, delivered: usize, failed: usize) {
        let mut stats = self.stats.lock();
        stats.published += 1;
        stats.delivered += delivered as u64;
        stats.failed += failed as u64;
        stats.last_dispatch_at = Some(Utc::now());
    }

    /// 移除所有事件的所有订阅
    pub fn clear(&self) {
        let removed: usize = {
            let mut subscriptions = self.subscriptions.write();
            let count = subscriptions.values().map(Vec::len).sum();
            subscriptions.clear();
            count
        };
        debug!(removed = removed, "已清空所有订阅");
    }

    /// 总订阅数量
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().values().map(Vec::len).sum()
    }

    /// 指定事件的订阅数量
    pub fn subscription_count_for(&self, event_name: &str) -> usize {
        self.subscriptions.read().get(event_name).map_or(0, Vec::len)
    }

    /// 指定事件是否有订阅者
    pub fn has_subscribers(&self, event_name: &str) -> bool {
        self.subscription_count_for(event_name) > 0
    }

    /// 获取分发统计信息
    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    /// 重置统计信息
    pub fn reset_stats(&self) {
        *self.stats.lock() = DispatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn custom() -> EventPayload {
        EventPayload::Custom(json!({}))
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(
            "test:event",
            Arc::new(move |event: Event| {
                assert_eq!(event.name, "test:event");
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(bus.publish("test:event", custom()), 1);
        assert_eq!(bus.publish("other:event", custom()), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            bus.subscribe("ordered", Arc::new(move |_| order.lock().push(i)));
        }

        bus.publish("ordered", custom());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let handle = bus.subscribe(
            "test:event",
            Arc::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let other = bus.subscribe("test:event", Arc::new(|_| {}));

        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        assert_eq!(bus.subscription_count_for("test:event"), 1);

        bus.publish("test:event", custom());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // 只移除对应的回调
        assert!(bus.unsubscribe("test:event", other.id()));
        assert!(!bus.has_subscribers("test:event"));
    }

    #[test]
    fn test_subscriber_isolation() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(
            "test:event",
            Arc::new(|_| {
                panic!("Intentional panic for test");
            }),
        );
        bus.subscribe(
            "test:event",
            Arc::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(bus.publish("test:event", custom()), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let stats = bus.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_reentrant_subscribe_during_publish() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_calls_clone = late_calls.clone();

        bus.subscribe(
            "test:event",
            Arc::new(move |_| {
                let late_calls = late_calls_clone.clone();
                inner_bus.subscribe(
                    "test:event",
                    Arc::new(move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        // 发布时使用快照，新订阅者不参与本次分发
        assert_eq!(bus.publish("test:event", custom()), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscription_count_for("test:event"), 2);
    }

    #[test]
    fn test_unsubscribe_self_during_publish() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();

        let handle = bus.subscribe(
            "once",
            Arc::new(move |_| {
                if let Some(handle) = slot_clone.lock().take() {
                    handle.unsubscribe();
                }
            }),
        );
        *slot.lock() = Some(handle);

        bus.publish("once", custom());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        let handle = bus.subscribe("a", Arc::new(|_| {}));
        bus.subscribe("b", Arc::new(|_| {}));
        assert_eq!(bus.subscription_count(), 2);

        bus.clear();
        assert_eq!(bus.subscription_count(), 0);
        assert!(!handle.unsubscribe());
    }

    #[test]
    fn test_handle_outlives_bus() {
        let handle = {
            let bus = EventBus::new();
            bus.subscribe("a", Arc::new(|_| {}))
        };
        assert!(!handle.unsubscribe());
        assert_eq!(handle.event_name(), "a");
    }

    #[test]
    fn test_reset_stats() {
        let bus = EventBus::new();
        bus.subscribe("a", Arc::new(|_| {}));
        bus.publish("a", custom());
        assert_eq!(bus.stats().published, 1);
        assert!(bus.stats().last_dispatch_at.is_some());

        bus.reset_stats();
        assert_eq!(bus.stats().published, 0);
    }
}
