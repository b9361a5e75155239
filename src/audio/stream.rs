//! 字节流抽象模块
//!
//! 所有后端只消费 [`AudioStream`]，从不直接接触具体的文件、内存或回调来源，
//! 因此新增来源类型时不需要修改任何后端。
//!
//! `AudioStream` 内部带有一个前瞻缓冲区：格式检测通过 [`AudioStream::peek`]
//! 预读头部字节而不推进逻辑位置，即使底层来源不可定位也能"还原"读取位置；
//! 同一个缓冲区也承担小块读取的合并，避免逐样本读取时频繁访问底层来源。

use crate::error::{AudioError, AudioResult};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// 小块读取时一次性从底层来源预取的字节数
const READ_AHEAD_BYTES: usize = 8 * 1024;

/// 流的能力标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamCapabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

impl StreamCapabilities {
    /// 可读可写可定位
    pub const ALL: Self = Self {
        readable: true,
        writable: true,
        seekable: true,
    };

    /// 只读且可定位（典型的输入文件）
    pub const READ_SEEK: Self = Self {
        readable: true,
        writable: false,
        seekable: true,
    };
}

fn capability_error(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("流不支持{what}"))
}

/// 字节来源/去向的统一接口
///
/// 默认实现对缺失的能力返回 `io::ErrorKind::Unsupported`，实现者只需覆盖
/// 自己支持的操作。
pub trait StreamSource: Send + Sync {
    fn capabilities(&self) -> StreamCapabilities;

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(capability_error("读取"))
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(capability_error("写入"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(capability_error("定位"))
    }

    /// 总字节数（未知时返回 `None`）
    fn len(&self) -> Option<u64> {
        None
    }
}

// ==================== 文件来源 ====================

struct FileSource {
    file: File,
    caps: StreamCapabilities,
}

impl StreamSource for FileSource {
    fn capabilities(&self) -> StreamCapabilities {
        self.caps
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn len(&self) -> Option<u64> {
        self.file.metadata().ok().map(|m| m.len())
    }
}

// ==================== 内存来源 ====================

/// 共享的内存缓冲区句柄
///
/// 会话消费 [`AudioStream`] 之后，调用方仍可通过自己持有的克隆取回编码结果。
#[derive(Clone, Default)]
pub struct MemoryBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 复制当前内容
    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// 取出内容；仍有其他句柄存活时退化为复制
    pub fn into_inner(self) -> Vec<u8> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("len", &self.len())
            .finish()
    }
}

struct MemorySource {
    buffer: MemoryBuffer,
    pos: u64,
}

impl StreamSource for MemorySource {
    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::ALL
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.buffer.inner.lock();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.buffer.inner.lock();
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.buffer.len() as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => len + d as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "定位到流起点之前",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn len(&self) -> Option<u64> {
        Some(self.buffer.len() as u64)
    }
}

// ==================== 回调来源 ====================

type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send + Sync>;
type WriteFn = Box<dyn FnMut(&[u8]) -> io::Result<usize> + Send + Sync>;
type SeekFn = Box<dyn FnMut(SeekFrom) -> io::Result<u64> + Send + Sync>;

/// 由调用方回调驱动的来源
///
/// 每个能力对应一个可选回调，未提供的回调即视为不具备该能力。
#[derive(Default)]
pub struct CallbackSource {
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    seek: Option<SeekFn>,
    len: Option<u64>,
}

impl CallbackSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取回调：返回写入 `buf` 的字节数，0 表示流结束
    pub fn with_read<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut [u8]) -> io::Result<usize> + Send + Sync + 'static,
    {
        self.read = Some(Box::new(f));
        self
    }

    pub fn with_write<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8]) -> io::Result<usize> + Send + Sync + 'static,
    {
        self.write = Some(Box::new(f));
        self
    }

    pub fn with_seek<F>(mut self, f: F) -> Self
    where
        F: FnMut(SeekFrom) -> io::Result<u64> + Send + Sync + 'static,
    {
        self.seek = Some(Box::new(f));
        self
    }

    /// 声明总字节数（已知时）
    pub fn with_len(mut self, len: u64) -> Self {
        self.len = Some(len);
        self
    }
}

impl StreamSource for CallbackSource {
    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities {
            readable: self.read.is_some(),
            writable: self.write.is_some(),
            seekable: self.seek.is_some(),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read.as_mut() {
            Some(f) => f(buf),
            None => Err(capability_error("读取")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write.as_mut() {
            Some(f) => f(buf),
            None => Err(capability_error("写入")),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.seek.as_mut() {
            Some(f) => f(pos),
            None => Err(capability_error("定位")),
        }
    }

    fn len(&self) -> Option<u64> {
        self.len
    }
}

// ==================== AudioStream ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    File,
    Memory,
    Custom,
}

/// 后端无关的字节流句柄
///
/// 不变式：底层来源的物理位置 = `position + lookahead.len()`。
pub struct AudioStream {
    source: Box<dyn StreamSource>,
    kind: StreamKind,
    caps: StreamCapabilities,
    position: u64,
    lookahead: Vec<u8>,
}

impl AudioStream {
    fn with_source(source: Box<dyn StreamSource>, kind: StreamKind) -> Self {
        let caps = source.capabilities();
        Self {
            source,
            kind,
            caps,
            position: 0,
            lookahead: Vec::new(),
        }
    }

    /// 以只读方式打开文件
    pub fn open_file<P: AsRef<Path>>(path: P) -> AudioResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::with_source(
            Box::new(FileSource {
                file,
                caps: StreamCapabilities::READ_SEEK,
            }),
            StreamKind::File,
        ))
    }

    /// 创建（或截断）文件用于写入
    pub fn create_file<P: AsRef<Path>>(path: P) -> AudioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        Ok(Self::from_file(file))
    }

    /// 包装已打开的文件，能力由操作系统在调用时裁决
    pub fn from_file(file: File) -> Self {
        Self::with_source(
            Box::new(FileSource {
                file,
                caps: StreamCapabilities::ALL,
            }),
            StreamKind::File,
        )
    }

    /// 基于共享内存缓冲区的流，从位置0开始
    pub fn memory(buffer: MemoryBuffer) -> Self {
        Self::with_source(
            Box::new(MemorySource { buffer, pos: 0 }),
            StreamKind::Memory,
        )
    }

    /// 直接从字节创建只在本流中使用的内存流
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::memory(MemoryBuffer::from_vec(bytes))
    }

    /// 调用方自定义的来源（包括 [`CallbackSource`]）
    pub fn custom<S: StreamSource + 'static>(source: S) -> Self {
        Self::with_source(Box::new(source), StreamKind::Custom)
    }

    pub fn capabilities(&self) -> StreamCapabilities {
        self.caps
    }

    pub fn is_seekable(&self) -> bool {
        self.caps.seekable
    }

    /// 当前逻辑位置（字节）
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 总字节数（未知时返回 `None`）
    pub fn len(&self) -> Option<u64> {
        self.source.len()
    }

    /// 剩余可读字节数（总长度未知时返回 `None`）
    pub fn remaining(&self) -> Option<u64> {
        self.len().map(|len| len.saturating_sub(self.position))
    }

    /// 预读最多 `n` 个字节而不推进逻辑位置
    ///
    /// 返回的切片可能短于 `n`（流在此之前结束）。
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if !self.caps.readable {
            return Err(capability_error("读取"));
        }
        while self.lookahead.len() < n {
            let start = self.lookahead.len();
            self.lookahead.resize(n, 0);
            let read = match self.source.read(&mut self.lookahead[start..]) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.lookahead.truncate(start);
                    continue;
                }
                Err(e) => {
                    self.lookahead.truncate(start);
                    return Err(e);
                }
            };
            self.lookahead.truncate(start + read);
            if read == 0 {
                break;
            }
        }
        let available = self.lookahead.len().min(n);
        Ok(&self.lookahead[..available])
    }

    /// 丢弃前瞻缓冲区，并将底层来源对齐到逻辑位置
    fn sync_source_position(&mut self) -> io::Result<()> {
        if self.lookahead.is_empty() {
            return Ok(());
        }
        if !self.caps.seekable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "不可定位的流在预读后不能切换为写入",
            ));
        }
        self.lookahead.clear();
        self.source.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    fn consume_lookahead(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.lookahead.len());
        buf[..n].copy_from_slice(&self.lookahead[..n]);
        self.lookahead.drain(..n);
        n
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("kind", &self.kind)
            .field("caps", &self.caps)
            .field("position", &self.position)
            .field("buffered", &self.lookahead.len())
            .finish()
    }
}

impl Read for AudioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.caps.readable {
            return Err(capability_error("读取"));
        }

        // 小块读取走前瞻缓冲区，大块读取直通底层来源
        if self.lookahead.is_empty() && buf.len() < READ_AHEAD_BYTES {
            // 预取中途出错但已拿到部分数据时先交付数据，错误留给下一次读取
            if let Err(e) = self.peek(READ_AHEAD_BYTES) {
                if self.lookahead.is_empty() {
                    return Err(e);
                }
            }
        }

        let n = if self.lookahead.is_empty() {
            self.source.read(buf)?
        } else {
            self.consume_lookahead(buf)
        };
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for AudioStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.caps.writable {
            return Err(capability_error("写入"));
        }
        self.sync_source_position()?;
        let n = self.source.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.source.flush()
    }
}

impl Seek for AudioStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(_) => None,
        };

        // 目标仍在前瞻缓冲区内时直接丢弃前缀，无需底层定位
        if let Some(target) = target {
            let buffered_end = self.position + self.lookahead.len() as u64;
            if target >= self.position && target <= buffered_end {
                let skip = (target - self.position) as usize;
                self.lookahead.drain(..skip);
                self.position = target;
                return Ok(target);
            }
        }

        if !self.caps.seekable {
            return Err(capability_error("定位"));
        }

        self.lookahead.clear();
        let physical = match (pos, target) {
            (SeekFrom::End(d), _) => SeekFrom::End(d),
            (_, Some(target)) => SeekFrom::Start(target),
            (_, None) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "定位到流起点之前",
                ));
            }
        };
        self.position = self.source.seek(physical)?;
        Ok(self.position)
    }
}

#[cfg(any(feature = "flac", feature = "mp3"))]
impl symphonia::core::io::MediaSource for AudioStream {
    fn is_seekable(&self) -> bool {
        self.caps.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.len()
    }
}

/// 尽量填满 `buf`，遇到流结束时返回实际读取的字节数
pub(crate) fn read_exact_or_eof(stream: &mut AudioStream, buf: &mut [u8]) -> AudioResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(AudioError::from(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_way_source(bytes: Vec<u8>) -> CallbackSource {
        let mut cursor = io::Cursor::new(bytes);
        CallbackSource::new().with_read(move |buf| cursor.read(buf))
    }

    #[test]
    fn peek_does_not_advance_position() {
        let mut stream = AudioStream::from_bytes(b"RIFF\0\0\0\0WAVEfmt ".to_vec());
        assert_eq!(stream.peek(4).unwrap(), b"RIFF");
        assert_eq!(stream.position(), 0);

        let mut buf = [0u8; 12];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[8..12], b"WAVE");
        assert_eq!(stream.position(), 12);
    }

    #[test]
    fn peek_restores_non_seekable_source() {
        let mut stream = AudioStream::custom(one_way_source(b"fLaC0123456789".to_vec()));
        assert!(!stream.is_seekable());
        assert_eq!(stream.peek(4).unwrap(), b"fLaC");

        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"fLaC0123456789");
    }

    #[test]
    fn seek_inside_lookahead_without_capability() {
        let mut stream = AudioStream::custom(one_way_source((0u8..32).collect()));
        stream.peek(16).unwrap();
        assert_eq!(stream.seek(SeekFrom::Start(10)).unwrap(), 10);
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 10);
        assert!(stream.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn memory_buffer_survives_stream() {
        let buffer = MemoryBuffer::new();
        {
            let mut stream = AudioStream::memory(buffer.clone());
            stream.write_all(b"abcdef").unwrap();
            stream.seek(SeekFrom::Start(2)).unwrap();
            stream.write_all(b"XY").unwrap();
            assert_eq!(stream.len(), Some(6));
        }
        assert_eq!(buffer.into_inner(), b"abXYef");
    }

    #[test]
    fn write_after_peek_rewinds_seekable_source() {
        let buffer = MemoryBuffer::from_vec(b"0123456789".to_vec());
        let mut stream = AudioStream::memory(buffer.clone());
        stream.peek(8).unwrap();
        stream.write_all(b"ab").unwrap();
        assert_eq!(stream.position(), 2);
        assert_eq!(buffer.to_vec(), b"ab23456789");
    }

    #[test]
    fn missing_capabilities_report_unsupported() {
        let mut stream = AudioStream::custom(CallbackSource::new().with_write(|buf| Ok(buf.len())));
        let caps = stream.capabilities();
        assert!(caps.writable && !caps.readable && !caps.seekable);
        let err = stream.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert_eq!(stream.write(b"xyz").unwrap(), 3);
    }
}
