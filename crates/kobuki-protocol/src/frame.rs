//! 字节流帧重组
//!
//! 把串口读到的任意分片字节拼成完整帧：查找 `0xAA 0x55` 帧头、按长度等待、
//! 校验 XOR 和，失败时从下一个帧头重新同步。
//!
//! # 失步报告
//!
//! 噪声字节和校验失败的候选帧在失步期间只做累计，等到下一个有效帧出现时
//! 先产出一个 `FramingError::Resync`，再产出该帧。这样一段噪声无论多长、
//! 内容如何，都只对应一条错误。
//!
//! # 停滞的候选帧
//!
//! 声明长度尚未到齐的候选帧一律等待，即使后面的字节里恰好能拼出一个有效帧
//! （真实帧的载荷可能包含 `AA 55 00 00` 这样的字节）。只有在帧超时后调用
//! [`FrameReassembler::discard_pending`] 时，才把停滞的候选帧当作噪声，
//! 从其后第一个有效帧处继续。
//!
//! # 缓冲区上限
//!
//! `feed` 按剩余容量分段读入输入，每段之间先取出已完成的帧，因此一次输入
//! 再长也不会挤掉尚未交付的有效帧。
//! # 使用示例
//!
//! ```rust
//! use kobuki_protocol::{FrameBuilder, FrameReassembler};
//!
//! let bytes = FrameBuilder::new().sub_packet(6, &[1, 2]).build().unwrap();
//!
//! let mut reassembler = FrameReassembler::new();
//! let frames: Vec<_> = reassembler.feed(&bytes[..3]).collect();
//! assert!(frames.is_empty()); // 不完整，保留在缓冲区
//!
//! let frames: Vec<_> = reassembler.feed(&bytes[3..]).collect();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_ref().unwrap().payload(), &[6, 2, 1, 2]);
//! ```

use crate::FramingError;
use crate::constants::*;
use crate::packets::{CoreSensors, Tag};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

/// 计算 XOR 校验和
///
/// 输入为 `LEN` 字节加上全部载荷字节。
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

/// 一个通过校验的完整帧（只保留载荷）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    payload: Bytes,
}

impl RawFrame {
    /// 从载荷构造（不做校验，用于回放和测试）
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// 载荷字节（不含帧头、长度和校验）
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// 重新编码为线上字节
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        out.extend_from_slice(&[HEADER_0, HEADER_1, self.payload.len() as u8]);
        out.extend_from_slice(&self.payload);
        out.push(checksum(&out[HEADER_LEN..]));
        out
    }
}

/// 帧重组器
///
/// 非可重入：同一实例只能由一个线程驱动（通常是串口读线程）。
pub struct FrameReassembler {
    buffer: BytesMut,
    capacity: usize,
    /// 失步期间累计丢弃的字节数
    discarded: usize,
    /// 失步期间累计的校验失败次数
    checksum_failures: usize,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// 指定缓冲区上限
    ///
    /// 上限至少能容纳一个最大帧（255 + 4 字节）。
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(u8::MAX as usize + FRAME_OVERHEAD);
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            discarded: 0,
            checksum_failures: 0,
        }
    }

    /// 输入新字节，返回惰性帧序列
    ///
    /// 迭代器耗尽后，未完成的帧留在缓冲区等待下次 `feed`。迭代器提前 drop 时，
    /// 尚未读入的输入会整体追加到缓冲区。
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            reassembler: self,
            input: bytes,
        }
    }

    /// 追加不超过剩余容量的前缀，返回读入的字节数
    ///
    /// 非空输入至少读入一个字节。`next_frame` 返回 `None` 之后缓冲区总有剩余
    /// 容量，所以交替调用 `fill` 和 `next_frame` 不会丢弃有效帧：
    ///
    /// ```rust
    /// use kobuki_protocol::{FrameBuilder, FrameReassembler};
    ///
    /// let one = FrameBuilder::new().sub_packet(6, &[1, 2]).build().unwrap();
    /// let bytes = one.repeat(200);
    ///
    /// let mut reassembler = FrameReassembler::with_capacity(512);
    /// let mut rest = &bytes[..];
    /// let mut frames = 0;
    /// while !rest.is_empty() {
    ///     rest = &rest[reassembler.fill(rest)..];
    ///     while let Some(frame) = reassembler.next_frame() {
    ///         assert!(frame.is_ok());
    ///         frames += 1;
    ///     }
    /// }
    /// assert_eq!(frames, 200);
    /// ```
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let spare = self.capacity.saturating_sub(self.buffer.len()).max(1);
        let n = spare.min(bytes.len());
        self.extend(&bytes[..n]);
        n
    }

    /// 仅追加字节，不解析
    ///
    /// 超出上限时丢弃最旧的字节（可能包含尚未取出的有效帧）。
    pub fn extend(&mut self, bytes: &[u8]) {
        let overflow = (self.buffer.len() + bytes.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            // 先丢弃最旧的缓冲字节，再丢弃输入的头部
            let from_buffer = overflow.min(self.buffer.len());
            self.discard(from_buffer);
            let from_input = overflow - from_buffer;
            self.discarded += from_input;
            debug!("Reassembly buffer overflow, dropped {} bytes", overflow);
            self.buffer.extend_from_slice(&bytes[from_input..]);
        } else {
            self.buffer.extend_from_slice(bytes);
        }
    }

    /// 缓冲区中尚未消费的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 丢弃停滞的不完整帧
    ///
    /// 读线程在超过帧超时仍无新字节时调用。缓冲区后面已有完整有效帧时只丢到
    /// 该帧为止，随后的 `next_frame` 会交付它；否则清空缓冲区。返回丢弃的
    /// 字节数，丢弃量会计入下一次 `Resync` 报告。
    pub fn discard_pending(&mut self) -> usize {
        let n = find_valid_frame(&self.buffer, 1).unwrap_or(self.buffer.len());
        if n > 0 {
            trace!("Discarding {} bytes of a stalled candidate", n);
        }
        self.discard(n);
        n
    }

    /// 尝试取出下一个帧或失步报告
    pub fn next_frame(&mut self) -> Option<Result<RawFrame, FramingError>> {
        loop {
            // === 1. 对齐到帧头 ===
            match find_header(&self.buffer, 0) {
                Some(0) => {},
                Some(pos) => self.discard(pos),
                None => {
                    // 末尾单个 0xAA 可能是下一个帧头的前半部分
                    let keep = usize::from(self.buffer.last() == Some(&HEADER_0));
                    let n = self.buffer.len() - keep;
                    self.discard(n);
                    return None;
                },
            }

            // === 2. 等待完整帧 ===
            let Some(total) = frame_len(&self.buffer) else {
                return None;
            };
            if self.buffer.len() < total {
                return None;
            }

            // === 3. 校验 ===
            let expected = checksum(&self.buffer[HEADER_LEN..total - 1]);
            let actual = self.buffer[total - 1];
            if expected != actual {
                trace!(
                    "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected, actual
                );
                self.checksum_failures += 1;
                // 只丢弃帧头首字节，候选帧内部可能藏着真正的帧头
                self.discard(1);
                continue;
            }

            // === 4. 先报告失步，再交付帧 ===
            if self.discarded > 0 || self.checksum_failures > 0 {
                let err = FramingError::Resync {
                    discarded: self.discarded,
                    checksum_failures: self.checksum_failures,
                };
                self.discarded = 0;
                self.checksum_failures = 0;
                return Some(Err(err));
            }

            let frame = self.buffer.split_to(total).freeze();
            return Some(Ok(RawFrame {
                payload: frame.slice(HEADER_LEN + 1..total - 1),
            }));
        }
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buffer.advance(n);
            self.discarded += n;
        }
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// `FrameReassembler::feed` 返回的惰性序列
pub struct Frames<'a> {
    reassembler: &'a mut FrameReassembler,
    /// 尚未读入缓冲区的输入
    input: &'a [u8],
}

impl Iterator for Frames<'_> {
    type Item = Result<RawFrame, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.reassembler.next_frame() {
                return Some(item);
            }
            if self.input.is_empty() {
                return None;
            }
            let n = self.reassembler.fill(self.input);
            self.input = &self.input[n..];
        }
    }
}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        if !self.input.is_empty() {
            self.reassembler.extend(self.input);
        }
    }
}

/// 从 `start` 开始查找 `0xAA 0x55`
fn find_header(buf: &[u8], start: usize) -> Option<usize> {
    if buf.len() < start + HEADER_LEN {
        return None;
    }
    (start..buf.len() - 1).find(|&i| buf[i] == HEADER_0 && buf[i + 1] == HEADER_1)
}

/// 帧头位于 `buf[0]` 时的整帧长度（长度字节尚未到达时返回 `None`）
fn frame_len(buf: &[u8]) -> Option<usize> {
    buf.get(HEADER_LEN)
        .map(|&len| len as usize + FRAME_OVERHEAD)
}

/// 从 `start` 开始查找第一个完整且校验通过的帧
fn find_valid_frame(buf: &[u8], start: usize) -> Option<usize> {
    let mut from = start;
    while let Some(pos) = find_header(buf, from) {
        let candidate = &buf[pos..];
        if let Some(total) = frame_len(candidate)
            && candidate.len() >= total
            && checksum(&candidate[HEADER_LEN..total - 1]) == candidate[total - 1]
        {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

/// 帧构造器（用于模拟器、回放夹具和测试）
///
/// # Example
///
/// ```
/// use kobuki_protocol::{CoreSensors, FrameBuilder};
///
/// let core = CoreSensors { buttons: 0x01, ..Default::default() };
/// let bytes = FrameBuilder::new().core_sensors(&core).build().unwrap();
/// assert_eq!(&bytes[..3], &[0xAA, 0x55, 17]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    payload: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个子包（TAG 可以是未知值）
    pub fn sub_packet(mut self, tag: u8, body: &[u8]) -> Self {
        self.payload.push(tag);
        self.payload.push(body.len() as u8);
        self.payload.extend_from_slice(body);
        self
    }

    pub fn core_sensors(self, core: &CoreSensors) -> Self {
        self.sub_packet(Tag::CoreSensors.as_u8(), &core.to_bytes())
    }

    /// 追加原始载荷字节（可构造畸形子包）
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// 生成完整线上字节
    pub fn build(&self) -> Result<Vec<u8>, FramingError> {
        if self.payload.len() > u8::MAX as usize {
            return Err(FramingError::PayloadTooLong {
                len: self.payload.len(),
            });
        }
        Ok(RawFrame::from_payload(self.payload.clone()).to_wire())
    }
}
