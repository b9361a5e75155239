//! 统一编解码会话
//!
//! 调用方面对的唯一入口：通过格式检测选择后端，管理后端生命周期，并把所有
//! 后端的样本统一为交错 f32 表示。
//!
//! 会话状态机：`Unopened -> Detecting -> BackendSelected -> Active ->
//! Finalized | Failed`。进入 `Failed` 后会话永久不可用，之后的每次调用都返回
//! 同一个原始错误；调用方参数错误（`InvalidArgument`）不会改变会话状态。

use super::backends::{DecoderBackend, EncoderBackend};
use super::detect::{FormatHint, FormatTag, detect_format};
use super::format::{AudioSpec, SampleBuffer};
use super::stream::AudioStream;
use crate::error::{self, AudioError, AudioResult};
use std::ops::ControlFlow;
use std::path::Path;

/// 默认的分块读取帧数
pub const DEFAULT_CHUNK_FRAMES: usize = 4096;

/// 会话状态
#[derive(Debug, Clone)]
pub enum SessionState {
    Unopened,
    /// 正在调用格式检测器
    Detecting,
    /// 后端已选定，正在解析/写入头部
    BackendSelected,
    /// 可以反复读写
    Active,
    /// 编码会话已完成收尾，或解码会话已读到流末尾
    Finalized,
    /// 后端报告了致命错误
    Failed(AudioError),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finalized | SessionState::Failed(_))
    }
}

fn advance(state: &mut SessionState, next: SessionState) {
    tracing::trace!(from = ?state, to = ?next, "会话状态迁移");
    *state = next;
}

/// 会话不处于 `Active` 时的错误
fn inactive_error(state: &SessionState, action: &str) -> AudioError {
    match state {
        SessionState::Failed(err) => err.clone(),
        SessionState::Finalized => error::invalid_argument(format!("会话已结束，不能再{action}")),
        other => error::invalid_argument(format!("会话处于{other:?}状态，不能{action}")),
    }
}

/// 检测结论为未知格式或后端未编译时，在实例化任何后端之前失败
fn ensure_backend_available(tag: FormatTag) -> AudioResult<()> {
    match tag {
        FormatTag::Unknown => Err(AudioError::UnsupportedFormat(
            "没有后端能识别该流".to_string(),
        )),
        tag if !tag.is_enabled() => Err(AudioError::UnsupportedFormat(format!(
            "{tag}后端未编译进本库"
        ))),
        _ => Ok(()),
    }
}

// ==================== 解码 ====================

/// 解码选项
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// 字节检测无结论时使用的提示；`Tag(Raw)` 会跳过检测
    pub hint: Option<FormatHint>,
    /// 无头部PCM的规格
    pub raw_spec: Option<AudioSpec>,
    /// `read_all` 内部每次读取的帧数
    pub chunk_frames: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            hint: None,
            raw_spec: None,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
        }
    }
}

impl DecodeOptions {
    pub fn with_hint(mut self, hint: FormatHint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// 按无头部PCM解码
    pub fn raw(spec: AudioSpec) -> Self {
        Self {
            hint: Some(FormatHint::Tag(FormatTag::Raw)),
            raw_spec: Some(spec),
            ..Self::default()
        }
    }
}

/// 解码会话
///
/// 持有流和后端，直到读到流末尾、发生致命错误或被丢弃。
pub struct DecodeSession {
    backend: Option<DecoderBackend>,
    format: FormatTag,
    spec: AudioSpec,
    state: SessionState,
    frames_read: u64,
    chunk_frames: usize,
}

impl DecodeSession {
    /// 检测格式并打开对应后端
    ///
    /// 打开失败时返回错误，不产生任何会话或音频规格。
    pub fn open(mut stream: AudioStream, options: DecodeOptions) -> AudioResult<Self> {
        let mut state = SessionState::Unopened;

        advance(&mut state, SessionState::Detecting);
        let format = match options.hint {
            Some(FormatHint::Tag(FormatTag::Raw)) => FormatTag::Raw,
            ref hint => detect_format(&mut stream, hint.as_ref())?,
        };
        ensure_backend_available(format)?;

        advance(&mut state, SessionState::BackendSelected);
        let (backend, spec) = DecoderBackend::open(format, stream, options.raw_spec.as_ref())?;

        tracing::debug!(
            format = %format,
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            frames = ?spec.total_frames,
            "解码会话已打开"
        );
        advance(&mut state, SessionState::Active);

        Ok(Self {
            backend: Some(backend),
            format,
            spec,
            state,
            frames_read: 0,
            chunk_frames: options.chunk_frames.max(1),
        })
    }

    /// 打开文件，以扩展名作为检测提示
    pub fn open_path<P: AsRef<Path>>(path: P) -> AudioResult<Self> {
        let path = path.as_ref();
        let stream = AudioStream::open_file(path)?;
        let options = DecodeOptions {
            hint: FormatHint::from_path(path),
            ..DecodeOptions::default()
        };
        Self::open(stream, options)
    }

    pub fn spec(&self) -> &AudioSpec {
        &self.spec
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// 已交给调用方的帧数（定位后从目标帧重新计数）
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn active_backend(&mut self, action: &str) -> AudioResult<&mut DecoderBackend> {
        if !self.state.is_active() {
            return Err(inactive_error(&self.state, action));
        }
        self.backend
            .as_mut()
            .ok_or_else(|| error::invalid_argument("解码后端已释放"))
    }

    /// 记录致命错误并释放后端
    fn fail(&mut self, err: AudioError) -> AudioError {
        if matches!(err, AudioError::InvalidArgument(_)) {
            return err;
        }
        tracing::warn!(format = %self.format, error = %err, "解码会话失败");
        self.backend = None;
        advance(&mut self.state, SessionState::Failed(err.clone()));
        err
    }

    /// 读取最多 `max_frames` 帧
    ///
    /// 流末尾返回一次空缓冲区，随后会话进入 `Finalized`。
    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        let backend = self.active_backend("读取")?;
        if max_frames == 0 {
            return Err(error::invalid_argument("max_frames必须大于0"));
        }
        let result = backend.read_frames(max_frames);
        match result {
            Ok(buffer) if buffer.is_empty() => {
                tracing::debug!(frames = self.frames_read, "解码会话读到流末尾");
                self.backend = None;
                advance(&mut self.state, SessionState::Finalized);
                Ok(buffer)
            }
            Ok(buffer) => {
                debug_assert_eq!(buffer.channels(), self.spec.channels);
                self.frames_read += buffer.frames() as u64;
                Ok(buffer)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// 定位到指定帧，之后的读取从该帧开始
    ///
    /// 流不支持定位或目标帧越界时返回错误，会话保持 `Active`。
    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        let result = self.active_backend("定位")?.seek_to_frame(frame);
        match result {
            Ok(()) => {
                self.frames_read = frame;
                Ok(())
            }
            Err(err @ (AudioError::Unsupported(_) | AudioError::InvalidArgument(_))) => {
                tracing::debug!(format = %self.format, frame, error = %err, "定位被拒绝");
                Err(err)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// 读取剩余的全部样本
    pub fn read_all(&mut self) -> AudioResult<SampleBuffer> {
        let capacity = self
            .spec
            .total_frames
            .map_or(0, |total| total.saturating_sub(self.frames_read) as usize);
        let mut all = SampleBuffer::with_capacity(self.spec.channels, capacity);

        loop {
            let chunk = self.read_frames(self.chunk_frames)?;
            if chunk.is_empty() {
                break;
            }
            all.append(&chunk)?;
        }
        Ok(all)
    }

    /// 按块读取并交给回调，回调返回 `Break` 时提前停止
    ///
    /// 返回交给回调的总帧数。提前停止后会话仍处于 `Active`。
    pub fn read_chunks<F>(&mut self, chunk_frames: usize, mut on_chunk: F) -> AudioResult<u64>
    where
        F: FnMut(&SampleBuffer) -> ControlFlow<()>,
    {
        let mut delivered = 0u64;
        loop {
            let chunk = self.read_frames(chunk_frames)?;
            if chunk.is_empty() {
                break;
            }
            delivered += chunk.frames() as u64;
            if on_chunk(&chunk).is_break() {
                tracing::debug!(delivered, "调用方中止分块读取");
                break;
            }
        }
        Ok(delivered)
    }

    /// 显式关闭会话，释放流和后端
    pub fn close(self) {
        tracing::trace!(format = %self.format, frames = self.frames_read, "关闭解码会话");
    }
}

// ==================== 编码 ====================

/// 编码会话
///
/// 输出在 `finalize` 成功之后才完整；未完成就丢弃会话会记录警告。
pub struct EncodeSession {
    backend: Option<EncoderBackend>,
    format: FormatTag,
    spec: AudioSpec,
    state: SessionState,
    frames_written: u64,
}

impl std::fmt::Debug for EncodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("format", &self.format)
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

impl EncodeSession {
    /// 以指定格式和规格开始编码，头部（如有）立即写入
    pub fn create(stream: AudioStream, format: FormatTag, spec: AudioSpec) -> AudioResult<Self> {
        let mut state = SessionState::Unopened;

        spec.validate().map_err(|err| match err {
            AudioError::Malformed(msg) => AudioError::InvalidArgument(msg),
            other => other,
        })?;
        if !stream.capabilities().writable {
            return Err(error::invalid_argument("编码需要可写的输出流"));
        }
        ensure_backend_available(format)?;

        advance(&mut state, SessionState::BackendSelected);
        let backend = EncoderBackend::open(format, stream, &spec)?;

        tracing::debug!(
            format = %format,
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            "编码会话已创建"
        );
        advance(&mut state, SessionState::Active);

        Ok(Self {
            backend: Some(backend),
            format,
            spec,
            state,
            frames_written: 0,
        })
    }

    /// 创建（或截断）文件并开始编码
    pub fn create_path<P: AsRef<Path>>(
        path: P,
        format: FormatTag,
        spec: AudioSpec,
    ) -> AudioResult<Self> {
        let stream = AudioStream::create_file(path)?;
        Self::create(stream, format, spec)
    }

    pub fn spec(&self) -> &AudioSpec {
        &self.spec
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn active_backend(&mut self, action: &str) -> AudioResult<&mut EncoderBackend> {
        if !self.state.is_active() {
            return Err(inactive_error(&self.state, action));
        }
        self.backend
            .as_mut()
            .ok_or_else(|| error::invalid_argument("编码后端已释放"))
    }

    fn fail(&mut self, err: AudioError) -> AudioError {
        if matches!(err, AudioError::InvalidArgument(_)) {
            return err;
        }
        tracing::warn!(format = %self.format, error = %err, "编码会话失败");
        self.backend = None;
        advance(&mut self.state, SessionState::Failed(err.clone()));
        err
    }

    /// 追加样本；缓冲区声道数必须与会话规格一致
    pub fn write_frames(&mut self, buffer: &SampleBuffer) -> AudioResult<()> {
        let channels = self.spec.channels;
        let backend = self.active_backend("写入")?;
        if buffer.channels() != channels {
            return Err(error::invalid_argument(format!(
                "缓冲区声道数({})与会话规格({channels})不一致",
                buffer.channels()
            )));
        }
        if buffer.is_empty() {
            return Ok(());
        }
        match backend.write_frames(buffer) {
            Ok(()) => {
                self.frames_written += buffer.frames() as u64;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// 追加交错样本，样本数必须是声道数的整数倍
    pub fn write_interleaved(&mut self, samples: &[f32]) -> AudioResult<()> {
        let buffer = SampleBuffer::from_interleaved(self.spec.channels, samples.to_vec())?;
        self.write_frames(&buffer)
    }

    /// 由回调按块产生样本并写入
    ///
    /// 回调收到 `(起始帧, 本块帧数)`，返回 `Continue(缓冲区)` 继续，返回
    /// `Break` 提前停止。返回本次写入的总帧数。
    pub fn write_chunks<F>(
        &mut self,
        total_frames: u64,
        chunk_frames: usize,
        mut produce: F,
    ) -> AudioResult<u64>
    where
        F: FnMut(u64, usize) -> ControlFlow<(), SampleBuffer>,
    {
        self.active_backend("写入")?;
        if chunk_frames == 0 {
            return Err(error::invalid_argument("chunk_frames必须大于0"));
        }
        let start = self.frames_written;
        let mut offset = 0u64;
        while offset < total_frames {
            let frames = (total_frames - offset).min(chunk_frames as u64) as usize;
            match produce(offset, frames) {
                ControlFlow::Continue(buffer) => self.write_frames(&buffer)?,
                ControlFlow::Break(()) => {
                    tracing::debug!(offset, "调用方中止分块写入");
                    break;
                }
            }
            offset += frames as u64;
        }
        Ok(self.frames_written - start)
    }

    /// 刷新后端并回填容器元数据
    ///
    /// 只能成功调用一次；再次调用返回 `InvalidArgument`，已写出的内容不受影响。
    pub fn finalize(&mut self) -> AudioResult<()> {
        let result = self.active_backend("完成编码")?.finalize();
        match result {
            Ok(()) => {
                tracing::debug!(
                    format = %self.format,
                    frames = self.frames_written,
                    "编码会话完成"
                );
                self.backend = None;
                advance(&mut self.state, SessionState::Finalized);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// 关闭会话；仍处于 `Active` 时先完成编码
    pub fn close(mut self) -> AudioResult<()> {
        if self.state.is_active() {
            self.finalize()?;
        }
        Ok(())
    }
}

impl Drop for EncodeSession {
    fn drop(&mut self) {
        if self.state.is_active() {
            tracing::warn!(
                format = %self.format,
                frames = self.frames_written,
                "编码会话未调用finalize就被丢弃，输出可能不完整"
            );
        }
    }
}

// ==================== 便捷函数 ====================

/// 解码整个文件
pub fn read_file<P: AsRef<Path>>(path: P) -> AudioResult<(AudioSpec, SampleBuffer)> {
    let mut session = DecodeSession::open_path(path)?;
    let samples = session.read_all()?;
    Ok((*session.spec(), samples))
}

/// 把整个缓冲区编码写入文件
pub fn write_file<P: AsRef<Path>>(
    path: P,
    format: FormatTag,
    spec: AudioSpec,
    samples: &SampleBuffer,
) -> AudioResult<()> {
    let mut session = EncodeSession::create_path(path, format, spec)?;
    session.write_frames(samples)?;
    session.finalize()
}

/// 只解析头部，返回格式和音频规格
pub fn probe<P: AsRef<Path>>(path: P) -> AudioResult<(FormatTag, AudioSpec)> {
    let session = DecodeSession::open_path(path)?;
    Ok((session.format(), *session.spec()))
}
