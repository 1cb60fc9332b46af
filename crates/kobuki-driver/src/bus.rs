//! 命名事件总线（EventBus）
//!
//! 按名称寻址、按载荷类型标记的发布/订阅注册表。
//!
//! # 类型安全
//!
//! 通道的载荷类型在第一次 `register` / `subscribe` / `publish` 时确定，此后用其他
//! 类型访问同名通道一律返回 [`BusError::TypeMismatch`]，且不改变通道的任何状态。
//! 订阅者列表按载荷类型分别存放在 [`Slots`] 的各个变体中，投递时无需运行时转型。
//!
//! # 投递语义
//!
//! - `publish` 在调用线程上同步扇出，按订阅注册顺序依次调用
//! - 扇出前在锁内复制订阅者列表，随后释放锁；扇出期间新增或移除的订阅不影响本轮
//! - 单个订阅者返回错误或 panic 不影响后续订阅者，失败在扇出结束后汇总到 [`FanOutReport`]
//! - 订阅者回调内禁止向**同一通道**再次 `publish`（不会死锁，但投递顺序无定义）
//!
//! # 示例
//!
//! ```rust
//! use kobuki_driver::bus::EventBus;
//! use kobuki_driver::events::ButtonEvent;
//!
//! let bus = EventBus::new();
//! let publisher = bus.register::<ButtonEvent>("/kobuki/button_event").unwrap();
//! let handle = bus
//!     .subscribe("/kobuki/button_event", |event: &ButtonEvent| {
//!         println!("buttons: {:#04x}", event.current);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let report = publisher.publish(&ButtonEvent { previous: 0, current: 1 });
//! assert_eq!(report.delivered, 1);
//!
//! // 同名通道换一种类型访问会被拒绝
//! assert!(bus.register::<String>("/kobuki/button_event").is_err());
//! assert!(bus.unsubscribe(&handle));
//! ```

use crate::error::{BusError, SlotError, SubscriberFailure};
use crate::events::*;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// 通道载荷类型
///
/// 声明顺序即内省输出中各分组的顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PayloadKind {
    Void,
    String,
    ButtonEvent,
    BumperEvent,
    CliffEvent,
    WheelEvent,
    PowerEvent,
    InputEvent,
    RobotEvent,
    VersionInfo,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 10] = [
        PayloadKind::Void,
        PayloadKind::String,
        PayloadKind::ButtonEvent,
        PayloadKind::BumperEvent,
        PayloadKind::CliffEvent,
        PayloadKind::WheelEvent,
        PayloadKind::PowerEvent,
        PayloadKind::InputEvent,
        PayloadKind::RobotEvent,
        PayloadKind::VersionInfo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::Void => "Void",
            PayloadKind::String => "String",
            PayloadKind::ButtonEvent => "ButtonEvent",
            PayloadKind::BumperEvent => "BumperEvent",
            PayloadKind::CliffEvent => "CliffEvent",
            PayloadKind::WheelEvent => "WheelEvent",
            PayloadKind::PowerEvent => "PowerEvent",
            PayloadKind::InputEvent => "InputEvent",
            PayloadKind::RobotEvent => "RobotEvent",
            PayloadKind::VersionInfo => "VersionInfo",
        }
    }

    /// 创建该类型的空订阅表
    fn empty_slots(self) -> Slots {
        match self {
            PayloadKind::Void => Slots::Void(Vec::new()),
            PayloadKind::String => Slots::String(Vec::new()),
            PayloadKind::ButtonEvent => Slots::ButtonEvent(Vec::new()),
            PayloadKind::BumperEvent => Slots::BumperEvent(Vec::new()),
            PayloadKind::CliffEvent => Slots::CliffEvent(Vec::new()),
            PayloadKind::WheelEvent => Slots::WheelEvent(Vec::new()),
            PayloadKind::PowerEvent => Slots::PowerEvent(Vec::new()),
            PayloadKind::InputEvent => Slots::InputEvent(Vec::new()),
            PayloadKind::RobotEvent => Slots::RobotEvent(Vec::new()),
            PayloadKind::VersionInfo => Slots::VersionInfo(Vec::new()),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 订阅者回调的返回值
pub type SlotResult = Result<(), SlotError>;

/// 订阅者（槽）
///
/// 闭包 `Fn(&E) -> SlotResult` 自动实现本 trait。
///
/// # 执行上下文
///
/// 回调运行在发布者的线程上，必须尽快返回，且不得向同一通道再次发布。
pub trait Slot<E>: Send + Sync {
    fn call(&self, event: &E) -> SlotResult;
}

impl<E, F> Slot<E> for F
where
    F: Fn(&E) -> SlotResult + Send + Sync,
{
    fn call(&self, event: &E) -> SlotResult {
        self(event)
    }
}

#[doc(hidden)]
pub type SlotList<E> = Vec<(u64, Arc<dyn Slot<E>>)>;

/// 按载荷类型分开存放的订阅表
///
/// 通道创建时即确定变体，之后只能以同一类型访问。
#[doc(hidden)]
pub enum Slots {
    Void(SlotList<()>),
    String(SlotList<String>),
    ButtonEvent(SlotList<ButtonEvent>),
    BumperEvent(SlotList<BumperEvent>),
    CliffEvent(SlotList<CliffEvent>),
    WheelEvent(SlotList<WheelEvent>),
    PowerEvent(SlotList<PowerEvent>),
    InputEvent(SlotList<InputEvent>),
    RobotEvent(SlotList<RobotEvent>),
    VersionInfo(SlotList<VersionInfo>),
}

macro_rules! with_slot_list {
    ($slots:expr, $list:ident => $body:expr) => {
        match $slots {
            Slots::Void($list) => $body,
            Slots::String($list) => $body,
            Slots::ButtonEvent($list) => $body,
            Slots::BumperEvent($list) => $body,
            Slots::CliffEvent($list) => $body,
            Slots::WheelEvent($list) => $body,
            Slots::PowerEvent($list) => $body,
            Slots::InputEvent($list) => $body,
            Slots::RobotEvent($list) => $body,
            Slots::VersionInfo($list) => $body,
        }
    };
}

impl Slots {
    fn len(&self) -> usize {
        with_slot_list!(self, list => list.len())
    }

    fn remove(&mut self, id: u64) -> bool {
        with_slot_list!(self, list => {
            let before = list.len();
            list.retain(|(slot_id, _)| *slot_id != id);
            list.len() != before
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// 可在总线上传输的载荷类型
///
/// 仅由本 crate 的固定载荷集合实现。
pub trait Event: sealed::Sealed + Clone + Send + Sync + 'static {
    const KIND: PayloadKind;

    #[doc(hidden)]
    fn slots(slots: &Slots) -> Option<&SlotList<Self>>;

    #[doc(hidden)]
    fn slots_mut(slots: &mut Slots) -> Option<&mut SlotList<Self>>;
}

macro_rules! impl_event {
    ($ty:ty, $kind:ident) => {
        impl sealed::Sealed for $ty {}

        impl Event for $ty {
            const KIND: PayloadKind = PayloadKind::$kind;

            fn slots(slots: &Slots) -> Option<&SlotList<Self>> {
                match slots {
                    Slots::$kind(list) => Some(list),
                    _ => None,
                }
            }

            fn slots_mut(slots: &mut Slots) -> Option<&mut SlotList<Self>> {
                match slots {
                    Slots::$kind(list) => Some(list),
                    _ => None,
                }
            }
        }
    };
}

impl_event!((), Void);
impl_event!(String, String);
impl_event!(ButtonEvent, ButtonEvent);
impl_event!(BumperEvent, BumperEvent);
impl_event!(CliffEvent, CliffEvent);
impl_event!(WheelEvent, WheelEvent);
impl_event!(PowerEvent, PowerEvent);
impl_event!(InputEvent, InputEvent);
impl_event!(RobotEvent, RobotEvent);
impl_event!(VersionInfo, VersionInfo);

/// 单个命名通道
struct Channel {
    kind: PayloadKind,
    slots: Slots,
    /// 存活的 `Publisher` 句柄数
    publishers: usize,
    /// 是否有调用方通过 `EventBus::publish` 匿名发布过
    anonymous_publisher: bool,
}

impl Channel {
    fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            slots: kind.empty_slots(),
            publishers: 0,
            anonymous_publisher: false,
        }
    }

    fn publisher_count(&self) -> usize {
        self.publishers + usize::from(self.anonymous_publisher)
    }
}

struct BusInner {
    channels: RwLock<BTreeMap<String, Channel>>,
    next_id: AtomicU64,
}

/// 订阅句柄
///
/// 不实现 RAII：订阅在显式 [`EventBus::unsubscribe`] 之前一直有效，
/// 未取消的订阅会体现在 [`EventBus::introspect`] 的计数里。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct SubscriptionHandle {
    name: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// 一次扇出的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct FanOutReport {
    /// 成功返回的订阅者数
    pub delivered: usize,
    /// 失败的订阅者（按扇出顺序）
    pub failures: Vec<SubscriberFailure>,
}

impl FanOutReport {
    /// 实际调用过的订阅者数（成功 + 失败）
    pub fn invoked(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 有失败时转为 `BusError::SubscriberFailures`
    pub fn into_result(self, channel: &str) -> Result<usize, BusError> {
        if self.failures.is_empty() {
            Ok(self.delivered)
        } else {
            Err(BusError::SubscriberFailures {
                channel: channel.to_string(),
                failures: self.failures,
            })
        }
    }
}

/// 命名事件总线
///
/// `Clone` 只复制句柄，所有克隆共享同一注册表。总线不是全局单例，
/// 由调用方创建并注入到各个驱动实例中。
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.inner.channels.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// 在写锁内取得（必要时创建）指定类型的通道
    fn with_channel<R>(
        &self,
        name: &str,
        kind: PayloadKind,
        f: impl FnOnce(&mut Channel) -> R,
    ) -> Result<R, BusError> {
        let mut channels = self.inner.channels.write();
        let channel = channels.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating channel {} ({})", name, kind);
            Channel::new(kind)
        });
        if channel.kind != kind {
            return Err(BusError::TypeMismatch {
                name: name.to_string(),
                registered: channel.kind,
                requested: kind,
            });
        }
        Ok(f(channel))
    }

    /// 按运行时类型声明通道（不计入发布者）
    ///
    /// 幂等；同名通道已绑定其他类型时返回 `TypeMismatch`。
    pub fn declare(&self, name: &str, kind: PayloadKind) -> Result<(), BusError> {
        self.with_channel(name, kind, |_| ())
    }

    /// 注册发布者
    ///
    /// 通道不存在时创建。返回的 [`Publisher`] 存活期间计为一个发布者。
    pub fn register<E: Event>(&self, name: &str) -> Result<Publisher<E>, BusError> {
        self.with_channel(name, E::KIND, |channel| channel.publishers += 1)?;
        Ok(Publisher {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    /// 以闭包订阅通道
    ///
    /// 订阅者追加到通道的有序列表末尾。
    pub fn subscribe<E, F>(&self, name: &str, callback: F) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        F: Fn(&E) -> SlotResult + Send + Sync + 'static,
    {
        self.subscribe_slot(name, Arc::new(callback))
    }

    /// 以 [`Slot`] 实现订阅通道
    pub fn subscribe_slot<E: Event>(
        &self,
        name: &str,
        slot: Arc<dyn Slot<E>>,
    ) -> Result<SubscriptionHandle, BusError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.with_channel(name, E::KIND, |channel| {
            if let Some(list) = E::slots_mut(&mut channel.slots) {
                list.push((id, slot));
            }
        })?;
        Ok(SubscriptionHandle {
            name: name.to_string(),
            id,
        })
    }

    /// 取消订阅，返回订阅是否存在
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut channels = self.inner.channels.write();
        channels
            .get_mut(&handle.name)
            .is_some_and(|channel| channel.slots.remove(handle.id))
    }

    /// 匿名发布
    ///
    /// 通道不存在时以 `E` 的类型创建。所有通过本方法发布的调用方合计为一个发布者；
    /// 需要独立计数的生产者应使用 [`EventBus::register`]。
    pub fn publish<E: Event>(&self, name: &str, event: &E) -> Result<FanOutReport, BusError> {
        let slots = self.with_channel(name, E::KIND, |channel| {
            channel.anonymous_publisher = true;
            snapshot_slots::<E>(channel)
        })?;
        Ok(fan_out(name, &slots, event))
    }

    pub fn kind_of(&self, name: &str) -> Option<PayloadKind> {
        self.inner.channels.read().get(name).map(|c| c.kind)
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .channels
            .read()
            .get(name)
            .map_or(0, |c| c.slots.len())
    }

    pub fn publisher_count(&self, name: &str) -> usize {
        self.inner
            .channels
            .read()
            .get(name)
            .map_or(0, Channel::publisher_count)
    }

    /// 按载荷类型分组的连接统计
    pub fn introspect(&self) -> Introspection {
        let channels = self.inner.channels.read();
        let mut entries: Vec<ChannelInfo> = channels
            .iter()
            .map(|(name, channel)| ChannelInfo {
                name: name.clone(),
                kind: channel.kind,
                subscribers: channel.slots.len(),
                publishers: channel.publisher_count(),
            })
            .collect();
        // BTreeMap 已按名称排序，稳定排序后组内仍按名称
        entries.sort_by_key(|info| info.kind);
        Introspection { channels: entries }
    }
}

fn snapshot_slots<E: Event>(channel: &Channel) -> SlotList<E> {
    E::slots(&channel.slots).cloned().unwrap_or_default()
}

/// 依次调用订阅者，隔离每个订阅者的错误和 panic
fn fan_out<E: Event>(name: &str, slots: &SlotList<E>, event: &E) -> FanOutReport {
    let mut report = FanOutReport::default();
    for (position, (id, slot)) in slots.iter().enumerate() {
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| slot.call(event))) {
            Ok(Ok(())) => {
                report.delivered += 1;
                continue;
            },
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(
            "Subscriber {} on {} failed at position {}: {}",
            id, name, position, reason
        );
        report.failures.push(SubscriberFailure {
            channel: name.to_string(),
            subscription: *id,
            position,
            reason,
        });
    }
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// 已注册的发布者句柄
///
/// 通道类型在注册时已校验，因此 `publish` 不会再失败。
/// 句柄 drop 时发布者计数减一；通道本身保留。
pub struct Publisher<E: Event> {
    inner: Arc<BusInner>,
    name: String,
    _marker: PhantomData<fn(E)>,
}

impl<E: Event> Publisher<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn publish(&self, event: &E) -> FanOutReport {
        let slots = {
            let channels = self.inner.channels.read();
            channels
                .get(&self.name)
                .map(snapshot_slots::<E>)
                .unwrap_or_default()
        };
        fan_out(&self.name, &slots, event)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .channels
            .read()
            .get(&self.name)
            .map_or(0, |c| c.slots.len())
    }
}

impl<E: Event> fmt::Debug for Publisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("kind", &E::KIND)
            .finish()
    }
}

impl<E: Event> Drop for Publisher<E> {
    fn drop(&mut self) {
        if let Some(channel) = self.inner.channels.write().get_mut(&self.name) {
            channel.publishers = channel.publishers.saturating_sub(1);
        }
    }
}

/// 单个通道的统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: PayloadKind,
    pub subscribers: usize,
    pub publishers: usize,
}

/// 内省结果（按载荷类型分组，组内按名称排序）
///
/// `Display` 输出格式：
///
/// ```text
/// ========== BumperEvent ==========
///   Name: /kobuki/bumper_event
///     # Subscribers: 2
///     # Publishers : 1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Introspection {
    pub channels: Vec<ChannelInfo>,
}

impl Introspection {
    pub fn get(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn by_kind(&self, kind: PayloadKind) -> impl Iterator<Item = &ChannelInfo> + '_ {
        self.channels.iter().filter(move |c| c.kind == kind)
    }

    /// 有订阅者但没有发布者的通道（通常是拼错的命名空间）
    pub fn dangling(&self) -> impl Iterator<Item = &ChannelInfo> + '_ {
        self.channels
            .iter()
            .filter(|c| c.subscribers > 0 && c.publishers == 0)
    }
}

impl fmt::Display for Introspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in PayloadKind::ALL {
            let mut group = self.by_kind(kind).peekable();
            if group.peek().is_none() {
                continue;
            }
            writeln!(f, "========== {} ==========", kind)?;
            for info in group {
                writeln!(f, "  Name: {}", info.name)?;
                writeln!(f, "    # Subscribers: {}", info.subscribers)?;
                writeln!(f, "    # Publishers : {}", info.publishers)?;
            }
        }
        Ok(())
    }
}
