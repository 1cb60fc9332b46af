//! 读循环
//!
//! 驱动本身不打开串口，只消费字节。传输层实现 [`ByteSource`]，
//! [`read_loop`] 负责拉取字节、喂给 `Kobuki`，并在空闲时处理帧超时和离线看门狗。
//!
//! # 字节源约定
//!
//! - `Ok(n > 0)`: 读到 n 个字节
//! - `Ok(0)` 或 `TimedOut` / `WouldBlock` / `Interrupted`: 暂时没有数据
//! - `UnexpectedEof`: 数据源结束，循环正常退出
//! - 其他错误: 循环以错误退出（重连由传输层负责）
//!
//! 实现应当在没有数据时阻塞一小段时间（例如串口读超时），否则读循环会空转。

use crate::error::DriverError;
use crate::kobuki::{Kobuki, SnapshotReader};
use crate::metrics::DriverMetrics;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, trace};

/// 单次读取的最大字节数
pub const READ_CHUNK_SIZE: usize = 512;

/// 字节源（传输层边界）
pub trait ByteSource {
    /// 读取当前可用的字节，语义见模块文档
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }
}

/// 把任意 `io::Read` 包装为字节源
///
/// `read` 返回 0 视为数据源结束。适用于文件回放，以及已设置读超时的串口。
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.read(buf)? {
            0 => Err(io::Error::new(ErrorKind::UnexpectedEof, "end of stream")),
            n => Ok(n),
        }
    }
}

/// 从 channel 接收字节块的字节源
///
/// 用于传输层以回调方式交付数据的场景。所有 `Sender` 关闭后视为数据源结束。
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    poll_timeout: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<u8>>, poll_timeout: Duration) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            poll_timeout,
        }
    }
}

impl ByteSource for ChannelSource {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.poll_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "sender closed"));
                },
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// 读循环退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// 运行标志被清除
    Stopped,
    /// 数据源结束
    EndOfStream,
}

/// 读循环
///
/// 在 `is_running` 为 true 期间持续拉取字节：
/// - 超过 `frame_timeout` 没有新字节且缓冲区非空时丢弃残帧
/// - 每次迭代检查离线看门狗
pub fn read_loop(
    source: &mut impl ByteSource,
    kobuki: &mut Kobuki,
    is_running: &AtomicBool,
) -> Result<LoopExit, DriverError> {
    let frame_timeout = kobuki.config().frame_timeout();
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut last_bytes = Instant::now();

    while is_running.load(Ordering::Acquire) {
        match source.read_available(&mut buf) {
            Ok(0) => {},
            Ok(n) => {
                trace!("Read {} bytes", n);
                kobuki.on_bytes(&buf[..n]);
                last_bytes = Instant::now();
            },
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {},
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                info!("Byte source reached end of stream");
                return Ok(LoopExit::EndOfStream);
            },
            Err(e) => {
                error!("Byte source failed: {}", e);
                return Err(e.into());
            },
        }

        let now = Instant::now();
        if kobuki.buffered() > 0 && now.duration_since(last_bytes) > frame_timeout {
            kobuki.discard_pending();
            last_bytes = now;
        }
        kobuki.check_liveness(now);
    }

    Ok(LoopExit::Stopped)
}

/// 后台读线程句柄
///
/// drop 时清除运行标志并等待线程退出。
pub struct ReadLoopHandle {
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<LoopExit, DriverError>>>,
    reader: SnapshotReader,
    metrics: Arc<DriverMetrics>,
}

/// 在后台线程中运行读循环
///
/// `Kobuki` 被移入线程；快照和指标通过返回的句柄读取，事件通过总线订阅。
pub fn spawn_read_loop<S>(mut source: S, mut kobuki: Kobuki) -> Result<ReadLoopHandle, DriverError>
where
    S: ByteSource + Send + 'static,
{
    let is_running = Arc::new(AtomicBool::new(true));
    let reader = kobuki.snapshot_reader();
    let metrics = Arc::clone(kobuki.metrics());

    let flag = Arc::clone(&is_running);
    let thread = thread::Builder::new()
        .name(format!("kobuki-rx{}", kobuki.namespace().replace('/', "-")))
        .spawn(move || read_loop(&mut source, &mut kobuki, &flag))?;

    Ok(ReadLoopHandle {
        is_running,
        thread: Some(thread),
        reader,
        metrics,
    })
}

impl ReadLoopHandle {
    pub fn snapshot_reader(&self) -> &SnapshotReader {
        &self.reader
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    /// 读线程是否已退出（数据源结束或出错）
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 停止并等待读线程
    pub fn stop(mut self) -> Result<LoopExit, DriverError> {
        self.is_running.store(false, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DriverError::ReadThreadPanicked)?,
            None => Ok(LoopExit::Stopped),
        }
    }
}

impl Drop for ReadLoopHandle {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Read thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::KobukiBuilder;
    use crossbeam_channel::unbounded;
    use kobuki_protocol::{CoreSensors, FrameBuilder};
    use std::collections::VecDeque;

    /// 按预设脚本返回结果的字节源
    struct ScriptedSource {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ByteSource for ScriptedSource {
        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                },
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(ErrorKind::UnexpectedEof, "done")),
            }
        }
    }

    fn frame(buttons: u8) -> Vec<u8> {
        let core = CoreSensors {
            buttons,
            battery: 160,
            ..Default::default()
        };
        FrameBuilder::new().core_sensors(&core).build().unwrap()
    }

    #[test]
    fn test_reader_source_replays_until_eof() {
        let mut bytes = frame(0);
        bytes.extend(frame(1));
        let mut source = ReaderSource::new(io::Cursor::new(bytes));
        let mut kobuki = KobukiBuilder::new().build().unwrap();
        let running = AtomicBool::new(true);

        let exit = read_loop(&mut source, &mut kobuki, &running).unwrap();
        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(kobuki.get_snapshot().frame_count, 2);
        assert_eq!(kobuki.discrete_state().buttons, 1);
    }

    #[test]
    fn test_timeouts_are_not_fatal() {
        let mut source = ScriptedSource {
            steps: VecDeque::from(vec![
                Err(io::Error::new(ErrorKind::TimedOut, "t")),
                Ok(frame(0)),
                Err(io::Error::new(ErrorKind::Interrupted, "i")),
                Ok(Vec::new()),
            ]),
        };
        let mut kobuki = KobukiBuilder::new().build().unwrap();
        let running = AtomicBool::new(true);

        let exit = read_loop(&mut source, &mut kobuki, &running).unwrap();
        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(kobuki.get_snapshot().frame_count, 1);
    }

    #[test]
    fn test_fatal_error_stops_loop() {
        let mut source = ScriptedSource {
            steps: VecDeque::from(vec![Err(io::Error::new(ErrorKind::BrokenPipe, "gone"))]),
        };
        let mut kobuki = KobukiBuilder::new().build().unwrap();
        let running = AtomicBool::new(true);

        let result = read_loop(&mut source, &mut kobuki, &running);
        assert!(matches!(result, Err(DriverError::Source(_))));
    }

    #[test]
    fn test_stopped_flag() {
        let mut source = ScriptedSource {
            steps: VecDeque::new(),
        };
        let mut kobuki = KobukiBuilder::new().build().unwrap();
        let running = AtomicBool::new(false);

        let exit = read_loop(&mut source, &mut kobuki, &running).unwrap();
        assert_eq!(exit, LoopExit::Stopped);
    }

    #[test]
    fn test_stale_partial_frame_dropped_after_timeout() {
        let bytes = frame(0);
        let (tx, rx) = unbounded();
        let mut source = ChannelSource::new(rx, Duration::from_millis(5));
        let mut kobuki = KobukiBuilder::new()
            .frame_timeout(Duration::from_millis(10))
            .build()
            .unwrap();

        tx.send(bytes[..6].to_vec()).unwrap();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(tx);
        });

        let running = AtomicBool::new(true);
        let exit = read_loop(&mut source, &mut kobuki, &running).unwrap();
        handle.join().unwrap();

        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(kobuki.buffered(), 0);
        assert_eq!(kobuki.metrics().snapshot().stale_frames_dropped, 1);
    }

    #[test]
    fn test_channel_source_splits_large_chunks() {
        let (tx, rx) = unbounded();
        let mut source = ChannelSource::new(rx, Duration::from_millis(1));
        tx.send(vec![7u8; 10]).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(source.read_available(&mut buf).unwrap(), 4);
        assert_eq!(source.read_available(&mut buf).unwrap(), 4);
        assert_eq!(source.read_available(&mut buf).unwrap(), 2);
        assert_eq!(source.read_available(&mut buf).unwrap(), 0);
        drop(tx);
        assert_eq!(
            source.read_available(&mut buf).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_spawned_loop_updates_snapshot() {
        let (tx, rx) = unbounded();
        let source = ChannelSource::new(rx, Duration::from_millis(5));
        let kobuki = KobukiBuilder::new().build().unwrap();
        let handle = spawn_read_loop(source, kobuki).unwrap();

        tx.send(frame(0)).unwrap();
        tx.send(frame(2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.snapshot_reader().frame_count() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(handle.snapshot_reader().frame_count(), 2);
        assert_eq!(handle.snapshot_reader().get().core.map(|c| c.buttons), Some(2));
        assert_eq!(handle.metrics().snapshot().frames_decoded, 2);

        assert_eq!(handle.stop().unwrap(), LoopExit::Stopped);
    }
}
