//! 事件系统
//!
//! 同步发布/订阅事件总线，用于观察模块的注册、加载、卸载与失败。
//!
//! - [`Event`] / [`EventPayload`] - 事件与其负载
//! - [`EventBus`] - 事件总线
//! - [`events`] - 框架发布的事件名

pub mod event_bus;
pub mod payload;

pub use event_bus::{DispatchStats, EventBus, EventCallback, SubscriptionHandle};
pub use payload::{events, Event, EventPayload};
