//! 钩子系统（Hook System）
//!
//! 在每个通过校验的原始帧进入解码器之前触发自定义回调，用于录制、抓包或统计。
//! 与事件总线不同，钩子看到的是未解码的载荷，解码失败的帧同样会经过钩子。
//!
//! # 使用示例
//!
//! ```rust
//! use kobuki_driver::hooks::{FrameCallback, HookManager};
//! use kobuki_driver::recording::AsyncRecordingHook;
//! use kobuki_protocol::RawFrame;
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//!
//! let (hook, _rx) = AsyncRecordingHook::new();
//! hooks.add_callback(Arc::new(hook) as Arc<dyn FrameCallback>);
//!
//! // 读线程中，每个有效帧解码前调用
//! let frame = RawFrame::from_payload(vec![6, 2, 1, 1]);
//! hooks.trigger_all(&frame);
//! ```

use kobuki_protocol::RawFrame;
use std::sync::Arc;

/// 帧回调 Trait
///
/// 回调运行在读线程上，必须非阻塞。需要耗时处理时，
/// 推荐用 `crossbeam_channel::Sender::try_send` 转交给其他线程。
///
/// # 示例
///
/// ```rust
/// use kobuki_driver::hooks::FrameCallback;
/// use kobuki_protocol::RawFrame;
/// use crossbeam_channel::{Sender, bounded};
///
/// struct PayloadSizes {
///     sender: Sender<usize>,
/// }
///
/// impl FrameCallback for PayloadSizes {
///     fn on_frame_received(&self, frame: &RawFrame) {
///         let _ = self.sender.try_send(frame.len());
///     }
/// }
/// ```
pub trait FrameCallback: Send + Sync {
    /// 收到一个通过校验的帧（解码前）
    fn on_frame_received(&self, frame: &RawFrame);
}

/// 钩子管理器
///
/// 回调列表本身不做同步，由 `Kobuki` 放在 `parking_lot::RwLock` 中共享。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 按注册顺序触发所有回调
    pub fn trigger_all(&self, frame: &RawFrame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(frame);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
