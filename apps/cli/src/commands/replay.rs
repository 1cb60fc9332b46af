//! replay 命令
//!
//! 把抓包文件按固定分片喂给驱动，打印总线上的事件、运行指标和通道内省。

use super::config::load_config;
use anyhow::{Context, Result};
use clap::Args;
use kobuki_driver::events::*;
use kobuki_driver::{
    AsyncRecordingHook, ByteSource, EventBus, FrameCallback, KobukiBuilder, Signal, SlotResult,
    channel_name, read_loop,
};
use std::fmt::Write as _;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// 回放命令参数
#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// 抓包文件路径
    pub input: PathBuf,

    /// 文件内容为十六进制文本（忽略空白）
    #[arg(long)]
    pub hex: bool,

    /// 每次喂入的字节数
    #[arg(long, default_value_t = 64)]
    pub chunk: usize,

    /// 驱动配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 覆盖命名空间
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// 逐帧打印 stream_data
    #[arg(long)]
    pub data: bool,

    /// 把通过校验的帧写入文件（去除噪声后的干净抓包）
    #[arg(long)]
    pub extract: Option<PathBuf>,

    /// 以 JSON 输出运行指标
    #[arg(long)]
    pub json: bool,
}

/// 内存中的抓包，按固定大小分片读出
pub struct CaptureSource {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl CaptureSource {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

impl ByteSource for CaptureSource {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "end of capture"));
        }
        let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// 解析十六进制文本抓包
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text.split_whitespace().collect();
    hex::decode(&cleaned).context("十六进制内容无效")
}

pub fn describe_button(e: &ButtonEvent) -> String {
    let mut out = String::new();
    for (button, state) in e.transitions() {
        let _ = write!(out, "{button:?} {state:?} ");
    }
    out.trim_end().to_string()
}

pub fn describe_bumper(e: &BumperEvent) -> String {
    let mut out = String::new();
    for (bumper, state) in e.transitions() {
        let _ = write!(out, "{bumper:?} {state:?} ");
    }
    out.trim_end().to_string()
}

pub fn describe_cliff(e: &CliffEvent) -> String {
    let mut out = String::new();
    for (sensor, state) in e.transitions() {
        let _ = write!(out, "{sensor:?} {state:?} ");
    }
    if let Some(bottom) = e.bottom {
        let _ = write!(out, "(adc {:?})", bottom);
    }
    out.trim_end().to_string()
}

pub fn describe_wheel(e: &WheelEvent) -> String {
    let mut out = String::new();
    for (wheel, state) in e.transitions() {
        let _ = write!(out, "{wheel:?} {state:?} ");
    }
    out.trim_end().to_string()
}

pub fn describe_power(e: &PowerEvent) -> String {
    format!("{:?} at {:.1} V", e.kinds().as_slice(), e.voltage())
}

pub fn describe_input(e: &InputEvent) -> String {
    format!("{:04b} -> {:04b}", e.previous, e.current)
}

pub fn describe_robot(e: &RobotEvent) -> String {
    let mut out = String::new();
    if e.came_online() {
        out.push_str("online ");
    } else if e.went_offline() {
        out.push_str("offline ");
    }
    for (wheel, over) in e.over_current_transitions() {
        let _ = write!(out, "{wheel:?} over-current {} ", if over { "on" } else { "off" });
    }
    out.trim_end().to_string()
}

/// 在每个通道上挂一个打印订阅者
fn print_events(bus: &EventBus, namespace: &str, data: bool, frames: Arc<AtomicU64>) -> Result<()> {
    fn printer<E, F>(bus: &EventBus, namespace: &str, signal: Signal, f: F) -> Result<()>
    where
        E: kobuki_driver::Event,
        F: Fn(&E) -> String + Send + Sync + 'static,
    {
        let label = signal.as_str();
        let _ = bus.subscribe(&channel_name(namespace, signal), move |e: &E| -> SlotResult {
            println!("{label:<13} {}", f(e));
            Ok(())
        })?;
        Ok(())
    }

    for signal in [Signal::RosDebug, Signal::RosInfo, Signal::RosWarn, Signal::RosError] {
        printer(bus, namespace, signal, |msg: &String| msg.clone())?;
    }
    printer(bus, namespace, Signal::ButtonEvent, describe_button)?;
    printer(bus, namespace, Signal::BumperEvent, describe_bumper)?;
    printer(bus, namespace, Signal::CliffEvent, describe_cliff)?;
    printer(bus, namespace, Signal::WheelEvent, describe_wheel)?;
    printer(bus, namespace, Signal::PowerEvent, describe_power)?;
    printer(bus, namespace, Signal::InputEvent, describe_input)?;
    printer(bus, namespace, Signal::RobotEvent, describe_robot)?;
    printer(bus, namespace, Signal::VersionInfo, |v: &VersionInfo| v.to_string())?;

    let _ = bus.subscribe(
        &channel_name(namespace, Signal::StreamData),
        move |_: &()| -> SlotResult {
            let n = frames.fetch_add(1, Ordering::Relaxed) + 1;
            if data {
                println!("{:<13} #{n}", Signal::StreamData.as_str());
            }
            Ok(())
        },
    )?;
    Ok(())
}

impl ReplayCommand {
    pub fn execute(&self) -> Result<()> {
        let raw = std::fs::read(&self.input)
            .with_context(|| format!("读取抓包失败: {}", self.input.display()))?;
        let bytes = if self.hex {
            parse_hex(&String::from_utf8_lossy(&raw))?
        } else {
            raw
        };

        let mut config = load_config(self.config.as_deref())?;
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        let namespace = config.namespace.clone();

        let bus = EventBus::new();
        let frames = Arc::new(AtomicU64::new(0));
        print_events(&bus, &namespace, self.data, frames.clone())?;

        let (recorder, rx) = AsyncRecordingHook::new();
        let dropped = recorder.dropped_frames().clone();
        let mut builder = KobukiBuilder::new().bus(bus.clone()).config(config);
        if self.extract.is_some() {
            builder = builder.callback(Arc::new(recorder) as Arc<dyn FrameCallback>);
        }
        let mut kobuki = builder.build()?;

        info!("Replaying {} bytes from {}", bytes.len(), self.input.display());
        let mut source = CaptureSource::new(bytes, self.chunk);
        let running = AtomicBool::new(true);
        let exit = read_loop(&mut source, &mut kobuki, &running)?;
        info!("Replay finished: {:?}", exit);
        if kobuki.buffered() > 0 {
            println!("(trailing {} bytes without a complete frame)", kobuki.buffered());
        }

        if let Some(path) = &self.extract {
            let mut out = Vec::new();
            let mut count = 0usize;
            while let Ok(frame) = rx.try_recv() {
                out.extend(frame.to_wire());
                count += 1;
            }
            std::fs::write(path, &out)
                .with_context(|| format!("写入失败: {}", path.display()))?;
            println!(
                "Extracted {} frames ({} dropped) to {}",
                count,
                dropped.load(Ordering::Relaxed),
                path.display()
            );
        }

        let metrics = kobuki.metrics().snapshot();
        println!();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        } else {
            println!("frames decoded : {}", metrics.frames_decoded);
            println!("stream_data    : {}", frames.load(Ordering::Relaxed));
            println!("framing errors : {} ({} bytes)", metrics.framing_errors, metrics.bytes_discarded);
            println!("decode errors  : {}", metrics.decode_errors);
            println!("unknown tags   : {}", metrics.unknown_tags);
            println!("events         : {}", metrics.events_published);
            println!("decode rate    : {:.1}%", metrics.decode_success_rate());
        }
        println!();
        print!("{}", bus.introspect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kobuki_driver::LoopExit;
    use kobuki_protocol::constants::*;
    use kobuki_protocol::{CoreSensors, FrameBuilder};

    #[test]
    fn test_parse_hex_ignores_whitespace() {
        assert_eq!(parse_hex("aa 55\n03 01\t").unwrap(), vec![0xAA, 0x55, 0x03, 0x01]);
        assert!(parse_hex("aa5").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_capture_source_chunks() {
        let mut source = CaptureSource::new((0..10).collect(), 4);
        let mut buf = [0u8; 16];
        assert_eq!(source.read_available(&mut buf).unwrap(), 4);
        assert_eq!(source.read_available(&mut buf).unwrap(), 4);
        assert_eq!(source.read_available(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[8, 9]);
        assert_eq!(
            source.read_available(&mut buf).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_replay_through_driver() {
        let core = CoreSensors {
            buttons: BUTTON_1,
            battery: 160,
            ..Default::default()
        };
        let mut bytes = vec![0x00, 0x13];
        bytes.extend(FrameBuilder::new().core_sensors(&core).build().unwrap());

        let mut kobuki = KobukiBuilder::new().build().unwrap();
        let mut source = CaptureSource::new(bytes, 3);
        let running = AtomicBool::new(true);
        assert_eq!(
            read_loop(&mut source, &mut kobuki, &running).unwrap(),
            LoopExit::EndOfStream
        );

        let metrics = kobuki.metrics().snapshot();
        assert_eq!(metrics.frames_decoded, 1);
        assert_eq!(metrics.bytes_discarded, 2);
    }

    #[test]
    fn test_descriptions() {
        let e = ButtonEvent {
            previous: 0,
            current: BUTTON_0 | BUTTON_2,
        };
        assert_eq!(describe_button(&e), "B0 Pressed B2 Pressed");

        let e = InputEvent {
            previous: 0b0001,
            current: 0b1000,
        };
        assert_eq!(describe_input(&e), "0001 -> 1000");

        let e = RobotEvent {
            previous: RobotSafety::default(),
            current: RobotSafety {
                online: true,
                over_current: OVER_CURRENT_LEFT,
            },
        };
        assert_eq!(describe_robot(&e), "online Left over-current on");
    }
}
