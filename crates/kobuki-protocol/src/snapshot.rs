//! 最新状态快照
//!
//! 不是每帧都携带全部子包类型，快照保留每个 TAG 最近一次解码的值，
//! 只被新到达的子包覆盖。

use crate::decoder::SnapshotDelta;
use crate::packets::*;

/// 按 TAG 合并的最新子包集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// 已合并的帧数
    pub frame_count: u64,

    pub core: Option<CoreSensors>,
    pub dock_ir: Option<DockInfraRed>,
    pub inertia: Option<Inertia>,
    pub cliff: Option<Cliff>,
    pub current: Option<Current>,
    pub hardware_version: Option<Version>,
    pub firmware_version: Option<Version>,
    pub gyro: Option<ThreeAxisGyro>,
    pub gp_input: Option<GeneralPurposeInput>,
    pub udid: Option<UniqueDeviceId>,
    pub controller_info: Option<ControllerInfo>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一帧的解码结果
    pub fn apply(&mut self, delta: &SnapshotDelta) {
        for packet in &delta.packets {
            self.merge(packet.clone());
        }
        self.frame_count += 1;
    }

    /// 覆盖单个子包
    pub fn merge(&mut self, packet: SubPacket) {
        match packet {
            SubPacket::CoreSensors(v) => self.core = Some(v),
            SubPacket::DockInfraRed(v) => self.dock_ir = Some(v),
            SubPacket::Inertia(v) => self.inertia = Some(v),
            SubPacket::Cliff(v) => self.cliff = Some(v),
            SubPacket::Current(v) => self.current = Some(v),
            SubPacket::HardwareVersion(v) => self.hardware_version = Some(v),
            SubPacket::FirmwareVersion(v) => self.firmware_version = Some(v),
            SubPacket::ThreeAxisGyro(v) => self.gyro = Some(v),
            SubPacket::GeneralPurposeInput(v) => self.gp_input = Some(v),
            SubPacket::UniqueDeviceId(v) => self.udid = Some(v),
            SubPacket::ControllerInfo(v) => self.controller_info = Some(v),
        }
    }

    /// 按 TAG 读取（映射视图）
    pub fn get(&self, tag: Tag) -> Option<SubPacket> {
        match tag {
            Tag::CoreSensors => self.core.map(SubPacket::CoreSensors),
            Tag::DockInfraRed => self.dock_ir.map(SubPacket::DockInfraRed),
            Tag::Inertia => self.inertia.map(SubPacket::Inertia),
            Tag::Cliff => self.cliff.map(SubPacket::Cliff),
            Tag::Current => self.current.map(SubPacket::Current),
            Tag::HardwareVersion => self.hardware_version.map(SubPacket::HardwareVersion),
            Tag::FirmwareVersion => self.firmware_version.map(SubPacket::FirmwareVersion),
            Tag::ThreeAxisGyro => self.gyro.clone().map(SubPacket::ThreeAxisGyro),
            Tag::GeneralPurposeInput => self.gp_input.map(SubPacket::GeneralPurposeInput),
            Tag::UniqueDeviceId => self.udid.map(SubPacket::UniqueDeviceId),
            Tag::ControllerInfo => self.controller_info.map(SubPacket::ControllerInfo),
        }
    }

    /// 已有数据的 TAG
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        Tag::ALL.into_iter().filter(|&tag| self.get(tag).is_some())
    }
}
