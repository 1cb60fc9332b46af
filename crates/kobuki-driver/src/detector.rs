//! 离散状态边沿检测
//!
//! 保存每个离散域的上一次取值，每来一个新快照就逐域比较，只在取值变化时产生事件。
//! 新状态先在局部变量中算完，最后一次性提交，检测器内部不会出现半更新的状态。
//!
//! 位掩码域（按钮、保险杠、悬崖、轮落、GPIO、过流）的初始值为 0，首个快照里
//! 被置位的位照常产生事件。电源状态和在线状态以首个快照为基线，不产生事件；
//! 离线后再收到快照时才发布上线事件。

use crate::events::*;
use kobuki_protocol::{CoreSensors, Snapshot};
use smallvec::SmallVec;

/// 离散域（声明顺序即事件输出顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Buttons,
    Bumpers,
    Cliffs,
    WheelDrop,
    Power,
    Gpio,
    Robot,
}

/// 单个离散域的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscreteEvent {
    Button(ButtonEvent),
    Bumper(BumperEvent),
    Cliff(CliffEvent),
    Wheel(WheelEvent),
    Power(PowerEvent),
    Input(InputEvent),
    Robot(RobotEvent),
}

impl DiscreteEvent {
    pub fn domain(&self) -> Domain {
        match self {
            DiscreteEvent::Button(_) => Domain::Buttons,
            DiscreteEvent::Bumper(_) => Domain::Bumpers,
            DiscreteEvent::Cliff(_) => Domain::Cliffs,
            DiscreteEvent::Wheel(_) => Domain::WheelDrop,
            DiscreteEvent::Power(_) => Domain::Power,
            DiscreteEvent::Input(_) => Domain::Gpio,
            DiscreteEvent::Robot(_) => Domain::Robot,
        }
    }
}

/// 检测器输出：若干离散事件，最后总是一个 `DataArrived`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Discrete(DiscreteEvent),
    DataArrived,
}

/// 电量等级阈值（0.1 V）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryThresholds {
    pub low_dv: u8,
    pub critical_dv: u8,
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self {
            low_dv: 140,
            critical_dv: 132,
        }
    }
}

impl BatteryThresholds {
    pub fn classify(&self, battery_dv: u8) -> BatteryLevel {
        if battery_dv < self.critical_dv {
            BatteryLevel::Critical
        } else if battery_dv < self.low_dv {
            BatteryLevel::Low
        } else {
            BatteryLevel::Healthy
        }
    }
}

/// 各离散域的最近取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscreteState {
    pub buttons: u8,
    pub bumper: u8,
    pub cliff: u8,
    pub wheel_drop: u8,
    pub power: PowerState,
    pub gpio: u8,
    pub robot: RobotSafety,
}

/// 边沿检测器
#[derive(Debug, Clone, Default)]
pub struct StateDeltaDetector {
    state: DiscreteState,
    thresholds: BatteryThresholds,
    /// 是否已处理过快照（在线状态基线）
    seen_snapshot: bool,
    /// 是否已见过核心传感器（电源状态基线）
    seen_power: bool,
}

impl StateDeltaDetector {
    pub fn new(thresholds: BatteryThresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn state(&self) -> &DiscreteState {
        &self.state
    }

    /// 比较新快照，按固定域顺序输出事件，末尾追加 `DataArrived`
    ///
    /// 快照中尚未出现的子包对应的域保持原值。
    pub fn update(&mut self, snapshot: &Snapshot) -> SmallVec<[Notification; 4]> {
        let mut prev = self.state;
        if !self.seen_snapshot {
            prev.robot.online = true;
        }
        if !self.seen_power
            && let Some(core) = &snapshot.core
        {
            prev.power = self.power_state(core);
        }
        let mut next = prev;
        let mut out = SmallVec::new();
        let mut emit = |event| out.push(Notification::Discrete(event));

        if let Some(core) = &snapshot.core {
            next.buttons = core.buttons;
            next.bumper = core.bumper;
            next.cliff = core.cliff;
            next.wheel_drop = core.wheel_drop;
            next.power = self.power_state(core);
            next.robot.over_current = core.over_current;

            if next.buttons != prev.buttons {
                emit(DiscreteEvent::Button(ButtonEvent {
                    previous: prev.buttons,
                    current: next.buttons,
                }));
            }
            if next.bumper != prev.bumper {
                emit(DiscreteEvent::Bumper(BumperEvent {
                    previous: prev.bumper,
                    current: next.bumper,
                }));
            }
            if next.cliff != prev.cliff {
                emit(DiscreteEvent::Cliff(CliffEvent {
                    previous: prev.cliff,
                    current: next.cliff,
                    bottom: snapshot.cliff.map(|c| c.bottom),
                }));
            }
            if next.wheel_drop != prev.wheel_drop {
                emit(DiscreteEvent::Wheel(WheelEvent {
                    previous: prev.wheel_drop,
                    current: next.wheel_drop,
                }));
            }
            if next.power != prev.power {
                emit(DiscreteEvent::Power(PowerEvent {
                    previous: prev.power,
                    current: next.power,
                    battery_dv: core.battery,
                }));
            }
        }

        if let Some(gp) = &snapshot.gp_input {
            next.gpio = gp.digital_mask();
            if next.gpio != prev.gpio {
                emit(DiscreteEvent::Input(InputEvent {
                    previous: prev.gpio,
                    current: next.gpio,
                }));
            }
        }

        // 收到快照即视为在线
        next.robot.online = true;
        if next.robot != prev.robot {
            emit(DiscreteEvent::Robot(RobotEvent {
                previous: prev.robot,
                current: next.robot,
            }));
        }

        out.push(Notification::DataArrived);
        self.state = next;
        self.seen_snapshot = true;
        self.seen_power |= snapshot.core.is_some();
        out
    }

    fn power_state(&self, core: &CoreSensors) -> PowerState {
        PowerState {
            charger: core.charger,
            battery: self.thresholds.classify(core.battery),
        }
    }

    /// 标记离线（看门狗超时）；已离线时返回 None
    pub fn mark_offline(&mut self) -> Option<DiscreteEvent> {
        if !self.state.robot.online {
            return None;
        }
        let previous = self.state.robot;
        self.state.robot.online = false;
        Some(DiscreteEvent::Robot(RobotEvent {
            previous,
            current: self.state.robot,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kobuki_protocol::{Cliff, CoreSensors, GeneralPurposeInput};

    fn snapshot_with(core: CoreSensors) -> Snapshot {
        Snapshot {
            core: Some(core),
            ..Default::default()
        }
    }

    fn healthy() -> CoreSensors {
        CoreSensors {
            battery: 160,
            ..Default::default()
        }
    }

    fn discrete(out: &[Notification]) -> Vec<DiscreteEvent> {
        out.iter()
            .filter_map(|n| match n {
                Notification::Discrete(e) => Some(*e),
                Notification::DataArrived => None,
            })
            .collect()
    }

    #[test]
    fn test_first_snapshot_sets_baseline() {
        let mut detector = StateDeltaDetector::default();
        // 电量 0 和充电状态都作为基线，不产生电源事件
        let out = detector.update(&snapshot_with(CoreSensors {
            charger: 6,
            ..Default::default()
        }));

        assert_eq!(out.as_slice(), &[Notification::DataArrived]);
        assert!(detector.state().robot.online);
        assert_eq!(detector.state().power.battery, BatteryLevel::Critical);
    }

    #[test]
    fn test_first_snapshot_button_press() {
        let mut detector = StateDeltaDetector::default();
        let out = detector.update(&snapshot_with(CoreSensors {
            buttons: 0x01,
            ..Default::default()
        }));

        assert_eq!(
            out.as_slice(),
            &[
                Notification::Discrete(DiscreteEvent::Button(ButtonEvent {
                    previous: 0x00,
                    current: 0x01
                })),
                Notification::DataArrived,
            ]
        );
    }

    #[test]
    fn test_power_baseline_waits_for_core_sensors() {
        let mut detector = StateDeltaDetector::default();
        detector.update(&Snapshot::default());

        let out = detector.update(&snapshot_with(CoreSensors {
            battery: 120,
            ..Default::default()
        }));
        assert_eq!(out.as_slice(), &[Notification::DataArrived]);

        let out = detector.update(&snapshot_with(healthy()));
        match discrete(&out).as_slice() {
            [DiscreteEvent::Power(e)] => {
                assert_eq!(e.kinds().as_slice(), &[PowerEventKind::BatteryRecovered]);
            },
            other => panic!("Expected power event, got {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_snapshot_emits_only_data_arrived() {
        let mut detector = StateDeltaDetector::default();
        let snapshot = snapshot_with(healthy());
        detector.update(&snapshot);

        let out = detector.update(&snapshot);
        assert_eq!(out.as_slice(), &[Notification::DataArrived]);
    }

    #[test]
    fn test_button_press_and_release() {
        let mut detector = StateDeltaDetector::default();
        detector.update(&snapshot_with(healthy()));

        let pressed = detector.update(&snapshot_with(CoreSensors {
            buttons: 0x01,
            ..healthy()
        }));
        assert_eq!(
            discrete(&pressed),
            vec![DiscreteEvent::Button(ButtonEvent {
                previous: 0x00,
                current: 0x01
            })]
        );

        let released = detector.update(&snapshot_with(healthy()));
        assert_eq!(
            discrete(&released),
            vec![DiscreteEvent::Button(ButtonEvent {
                previous: 0x01,
                current: 0x00
            })]
        );
    }

    #[test]
    fn test_multiple_domains_in_priority_order() {
        let mut detector = StateDeltaDetector::default();
        detector.update(&snapshot_with(healthy()));

        let mut snapshot = snapshot_with(CoreSensors {
            buttons: 0x02,
            bumper: 0x04,
            cliff: 0x01,
            wheel_drop: 0x02,
            charger: 6,
            over_current: 0x01,
            ..healthy()
        });
        snapshot.gp_input = Some(GeneralPurposeInput {
            digital: 0x0003,
            analog: [0; 4],
        });
        snapshot.cliff = Some(Cliff {
            bottom: [100, 200, 300],
        });

        let out = detector.update(&snapshot);
        let domains: Vec<_> = discrete(&out).iter().map(|e| e.domain()).collect();
        assert_eq!(
            domains,
            vec![
                Domain::Buttons,
                Domain::Bumpers,
                Domain::Cliffs,
                Domain::WheelDrop,
                Domain::Power,
                Domain::Gpio,
                Domain::Robot,
            ]
        );
        match discrete(&out)[2] {
            DiscreteEvent::Cliff(e) => assert_eq!(e.bottom, Some([100, 200, 300])),
            other => panic!("Expected cliff event, got {:?}", other),
        }
        assert_eq!(out.last(), Some(&Notification::DataArrived));
    }

    #[test]
    fn test_battery_level_changes() {
        let mut detector = StateDeltaDetector::new(BatteryThresholds::default());
        detector.update(&snapshot_with(healthy()));

        // 电压抖动但等级不变
        let out = detector.update(&snapshot_with(CoreSensors {
            battery: 155,
            ..healthy()
        }));
        assert!(discrete(&out).is_empty());

        let out = detector.update(&snapshot_with(CoreSensors {
            battery: 135,
            ..healthy()
        }));
        match discrete(&out).as_slice() {
            [DiscreteEvent::Power(e)] => {
                assert_eq!(e.kinds().as_slice(), &[PowerEventKind::BatteryLow]);
                assert_eq!(e.battery_dv, 135);
            },
            other => panic!("Expected power event, got {:?}", other),
        }
    }

    #[test]
    fn test_thresholds_classify() {
        let t = BatteryThresholds::default();
        assert_eq!(t.classify(160), BatteryLevel::Healthy);
        assert_eq!(t.classify(140), BatteryLevel::Healthy);
        assert_eq!(t.classify(139), BatteryLevel::Low);
        assert_eq!(t.classify(132), BatteryLevel::Low);
        assert_eq!(t.classify(131), BatteryLevel::Critical);
    }

    #[test]
    fn test_snapshot_without_core_keeps_state() {
        let mut detector = StateDeltaDetector::default();
        detector.update(&snapshot_with(CoreSensors {
            bumper: 0x01,
            ..healthy()
        }));
        let before = *detector.state();

        let out = detector.update(&Snapshot::default());
        assert_eq!(out.as_slice(), &[Notification::DataArrived]);
        assert_eq!(*detector.state(), before);
    }

    #[test]
    fn test_mark_offline_once() {
        let mut detector = StateDeltaDetector::default();
        assert_eq!(detector.mark_offline(), None);

        detector.update(&snapshot_with(healthy()));
        match detector.mark_offline() {
            Some(DiscreteEvent::Robot(e)) => assert!(e.went_offline()),
            other => panic!("Expected robot event, got {:?}", other),
        }
        assert_eq!(detector.mark_offline(), None);

        // 下一个快照重新上线
        let out = detector.update(&snapshot_with(healthy()));
        assert!(matches!(
            discrete(&out).as_slice(),
            [DiscreteEvent::Robot(e)] if e.came_online()
        ));
    }
}
