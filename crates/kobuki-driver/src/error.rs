//! 驱动层错误类型定义

use crate::bus::PayloadKind;
use thiserror::Error;

/// 事件总线错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// 通道名已绑定到其他载荷类型（只拒绝本次调用，通道不受影响）
    #[error("Type mismatch on channel '{name}': registered as {registered}, requested {requested}")]
    TypeMismatch {
        name: String,
        registered: PayloadKind,
        requested: PayloadKind,
    },

    /// 扇出结束后汇总的订阅者失败
    #[error("{count} subscriber(s) failed on channel '{channel}'", count = .failures.len())]
    SubscriberFailures {
        channel: String,
        failures: Vec<SubscriberFailure>,
    },
}

/// 单个订阅者在扇出中的失败记录
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Subscriber #{position} (id {subscription}) on '{channel}' failed: {reason}")]
pub struct SubscriberFailure {
    pub channel: String,
    /// 订阅 ID（见 `SubscriptionHandle::id`）
    pub subscription: u64,
    /// 在本轮扇出中的位置（从 0 开始）
    pub position: usize,
    pub reason: String,
}

/// 订阅者回调返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SlotError(pub String);

impl SlotError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<&str> for SlotError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

impl From<String> for SlotError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 事件总线错误（通常是通道类型冲突）
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// 固件版本要求无法解析
    #[error("Invalid firmware requirement: {0}")]
    FirmwareRequirement(#[from] semver::Error),

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 字节源读取失败
    #[error("Byte source error: {0}")]
    Source(#[from] std::io::Error),

    /// 读取线程 panic
    #[error("Read thread panicked")]
    ReadThreadPanicked,
}
