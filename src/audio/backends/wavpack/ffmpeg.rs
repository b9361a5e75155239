//! FFmpeg子进程桥接
//!
//! WavPack样本的压缩与解压由外部ffmpeg进程完成，这里只负责管道：
//! 解码时后台线程把输入流泵入stdin，PCM从stdout读回；编码时PCM写入stdin，
//! 后台线程把stdout中的WavPack块转写到输出流。

use super::header::{BLOCK_HEADER_LEN, BLOCK_MAGIC, split_total};
use crate::audio::format::{AudioSpec, SampleFormat};
use crate::audio::stream::AudioStream;
use crate::error::{self, AudioError, AudioResult};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};

/// FFmpeg安装指南（跨平台）
const FFMPEG_INSTALL_GUIDE: &str = r#"
FFmpeg is required for WavPack support / 需要安装FFmpeg以支持WavPack格式

Installation / 安装方法:
  macOS:   brew install ffmpeg
  Windows: https://www.gyan.dev/ffmpeg/builds/
           或使用: winget install Gyan.FFmpeg
  Linux:
    - Ubuntu/Debian: sudo apt install ffmpeg
    - Fedora/RHEL:   sudo dnf install ffmpeg
    - Arch:          sudo pacman -S ffmpeg

Official site / 官方网站: https://ffmpeg.org/download.html
"#;

static FFMPEG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// 查找可执行的ffmpeg（跨平台）
fn find_ffmpeg_path() -> Option<PathBuf> {
    let runs = |p: &Path| {
        Command::new(p)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };

    #[cfg(target_os = "windows")]
    {
        let mut candidates = vec![
            PathBuf::from("ffmpeg.exe"),
            PathBuf::from(r"C:\Program Files\ffmpeg\bin\ffmpeg.exe"),
            PathBuf::from(r"C:\ffmpeg\bin\ffmpeg.exe"),
        ];
        // 便携部署：与可执行文件同目录
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        if let Some(dir) = exe_dir {
            candidates.push(dir.join("ffmpeg.exe"));
        }
        candidates.into_iter().find(|p| runs(p.as_path()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let path = PathBuf::from("ffmpeg");
        runs(path.as_path()).then_some(path)
    }
}

fn ffmpeg_path() -> AudioResult<&'static Path> {
    FFMPEG_PATH
        .get_or_init(|| {
            let found = find_ffmpeg_path();
            tracing::debug!(path = ?found, "查找FFmpeg");
            found
        })
        .as_deref()
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("WavPack后端需要FFmpeg{FFMPEG_INSTALL_GUIDE}"))
        })
}

/// 运行时能否找到ffmpeg（结果在进程内缓存）
pub fn ffmpeg_available() -> bool {
    ffmpeg_path().is_ok()
}

/// 找不到ffmpeg时返回带安装指南的 `UnsupportedFormat`
pub fn ensure_ffmpeg() -> AudioResult<()> {
    ffmpeg_path().map(|_| ())
}

fn spawn(args: &[String]) -> AudioResult<Child> {
    let path = ffmpeg_path()?;
    tracing::trace!(?args, "启动FFmpeg");
    Command::new(path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(AudioError::from)
}

fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut raw = Vec::new();
            let _ = stderr.read_to_end(&mut raw);
            String::from_utf8_lossy(&raw).trim().to_string()
        })
        .ok()
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn exit_message(status: ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("FFmpeg异常退出({status})")
    } else {
        format!("FFmpeg异常退出({status}): {stderr}")
    }
}

/// 尽量填满 `buf`，遇到EOF时返回实际读取的字节数
pub fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn thread_lost(what: &str) -> AudioError {
    AudioError::from(io::Error::other(format!("FFmpeg{what}线程异常退出")))
}

// ==================== 解码 ====================

type Feeder = JoinHandle<(AudioStream, io::Result<()>)>;

/// 解码方向的ffmpeg进程
///
/// 输出为交错的32位小端PCM：整数流为 `s32le`（样本左对齐），浮点流为 `f32le`。
pub struct PipeDecoder {
    child: Child,
    stdout: Option<ChildStdout>,
    feeder: Option<Feeder>,
    stderr: Option<JoinHandle<String>>,
}

impl PipeDecoder {
    pub fn start(float: bool) -> AudioResult<Self> {
        let (format, codec) = if float {
            ("f32le", "pcm_f32le")
        } else {
            ("s32le", "pcm_s32le")
        };
        let args: Vec<String> = [
            "-v", "error", "-f", "wv", "-i", "pipe:0", "-map", "0:a:0", "-c:a", codec, "-f",
            format, "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut child = spawn(&args)?;
        let stderr = collect_stderr(&mut child);
        let stdout = child.stdout.take();
        Ok(Self {
            child,
            stdout,
            feeder: None,
            stderr,
        })
    }

    /// 从流的当前位置起把WavPack块泵入ffmpeg
    pub fn feed(&mut self, mut stream: AudioStream) -> AudioResult<()> {
        let mut stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| thread_lost("输入"))?;
        let handle = thread::Builder::new()
            .name("wavpack-feed".to_string())
            .spawn(move || {
                let result = match io::copy(&mut stream, &mut stdin) {
                    Ok(_) => Ok(()),
                    // ffmpeg已退出或被终止，退出状态会另行检查
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    Err(e) => Err(e),
                };
                drop(stdin);
                (stream, result)
            })?;
        self.feeder = Some(handle);
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        let stdout = self.stdout.as_mut().ok_or_else(|| thread_lost("输出"))?;
        Ok(fill(stdout, buf)?)
    }

    fn join_feeder(&mut self) -> AudioResult<(AudioStream, io::Result<()>)> {
        self.feeder
            .take()
            .ok_or_else(|| thread_lost("输入"))?
            .join()
            .map_err(|_| thread_lost("输入"))
    }

    /// PCM读完之后收尾：检查退出状态并取回输入流
    pub fn finish(&mut self) -> AudioResult<AudioStream> {
        self.stdout = None;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        let (stream, fed) = self.join_feeder()?;
        if !status.success() {
            return Err(error::corrupt(exit_message(status, &stderr)));
        }
        fed?;
        if !stderr.is_empty() {
            tracing::warn!(stderr = %stderr, "FFmpeg解码时报告了问题");
        }
        Ok(stream)
    }

    /// 中途终止进程并取回输入流
    pub fn abort(&mut self) -> AudioResult<AudioStream> {
        self.stdout = None;
        let _ = self.child.kill();
        self.child.wait()?;
        join_stderr(self.stderr.take());
        let (stream, _) = self.join_feeder()?;
        Ok(stream)
    }
}

impl Drop for PipeDecoder {
    fn drop(&mut self) {
        // 确保FFmpeg进程被清理
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ==================== 编码 ====================

type Drain = JoinHandle<(AudioStream, io::Result<Option<u64>>)>;

fn input_format(spec: &AudioSpec) -> AudioResult<&'static str> {
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => Ok("s8"),
        (SampleFormat::Int, 16) => Ok("s16le"),
        (SampleFormat::Int, 24) => Ok("s24le"),
        (SampleFormat::Int, 32) => Ok("s32le"),
        (SampleFormat::Float, 32) => Ok("f32le"),
        (format, bits) => Err(error::unsupported(format!(
            "WavPack无法表示 {format:?} {bits}位样本"
        ))),
    }
}

/// 把ffmpeg输出的WavPack块写入流，并改写首块的总帧数
///
/// 返回首块在流中的起始位置；ffmpeg没有输出任何内容时返回 `None`。
fn copy_blocks<R: Read>(
    output: &mut R,
    stream: &mut AudioStream,
    declared_total: Option<u64>,
) -> io::Result<Option<u64>> {
    let mut first = [0u8; BLOCK_HEADER_LEN];
    let filled = fill(output, &mut first)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < BLOCK_HEADER_LEN || &first[..4] != BLOCK_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "FFmpeg输出不是WavPack块",
        ));
    }

    let (total_u8, total) = split_total(declared_total);
    first[11] = total_u8;
    first[12..16].copy_from_slice(&total.to_le_bytes());

    let position = stream.position();
    stream.write_all(&first)?;
    io::copy(output, stream)?;
    Ok(Some(position))
}

/// 编码方向的ffmpeg进程
pub struct PipeEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    drain: Option<Drain>,
    stderr: Option<JoinHandle<String>>,
}

impl PipeEncoder {
    /// 启动编码进程；`declared_total` 先写入首块，输出可定位时由调用方回填
    pub fn start(
        stream: AudioStream,
        spec: &AudioSpec,
        declared_total: Option<u64>,
    ) -> AudioResult<Self> {
        let input = input_format(spec)?;
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-f".into(),
            input.into(),
            "-ar".into(),
            spec.sample_rate.to_string(),
            "-ac".into(),
            spec.channels.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-c:a".into(),
            "wavpack".into(),
            "-bits_per_raw_sample".into(),
            spec.bits_per_sample.to_string(),
            "-map_metadata".into(),
            "-1".into(),
            "-fflags".into(),
            "+bitexact".into(),
            "-f".into(),
            "wv".into(),
            "pipe:1".into(),
        ];

        let mut child = spawn(&args)?;
        let stderr = collect_stderr(&mut child);
        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().ok_or_else(|| thread_lost("输出"))?;

        let mut stream = stream;
        let drain = thread::Builder::new()
            .name("wavpack-drain".to_string())
            .spawn(move || {
                let result = copy_blocks(&mut stdout, &mut stream, declared_total);
                if result.is_err() {
                    // 继续读空管道，避免ffmpeg阻塞在写输出上
                    let _ = io::copy(&mut stdout, &mut io::sink());
                }
                (stream, result)
            })?;

        Ok(Self {
            child,
            stdin,
            drain: Some(drain),
            stderr,
        })
    }

    /// ffmpeg提前退出时的错误
    fn exit_error(&mut self) -> AudioError {
        self.stdin = None;
        let stderr = join_stderr(self.stderr.take());
        match self.child.wait() {
            Ok(status) if !status.success() => error::unsupported(exit_message(status, &stderr)),
            Ok(_) => error::corrupt("FFmpeg提前关闭了输入管道"),
            Err(e) => AudioError::from(e),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> AudioResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| thread_lost("输入"))?;
        match stdin.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(self.exit_error()),
            Err(e) => Err(AudioError::from(e)),
        }
    }

    /// 关闭输入，等待全部块写出
    ///
    /// 返回输出流与首块位置（没有输出任何块时为 `None`）。
    pub fn finish(&mut self) -> AudioResult<(AudioStream, Option<u64>)> {
        self.stdin = None;
        let (stream, copied) = self
            .drain
            .take()
            .ok_or_else(|| thread_lost("输出"))?
            .join()
            .map_err(|_| thread_lost("输出"))?;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(error::unsupported(exit_message(status, &stderr)));
        }
        let first_block = copied?;
        Ok((stream, first_block))
    }

    /// 不等待输出，直接终止进程并取回输出流
    pub fn abort(&mut self) -> AudioResult<AudioStream> {
        self.stdin = None;
        let _ = self.child.kill();
        self.child.wait()?;
        join_stderr(self.stderr.take());
        let (stream, _) = self
            .drain
            .take()
            .ok_or_else(|| thread_lost("输出"))?
            .join()
            .map_err(|_| thread_lost("输出"))?;
        Ok(stream)
    }
}

impl Drop for PipeEncoder {
    fn drop(&mut self) {
        self.stdin = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_availability() {
        // 仅在系统安装FFmpeg时为true
        let available = ffmpeg_available();
        println!("FFmpeg available / FFmpeg可用: {available}");
        assert_eq!(available, ffmpeg_available());
    }

    #[test]
    fn test_install_guide_contains_all_platforms() {
        assert!(FFMPEG_INSTALL_GUIDE.contains("macOS"));
        assert!(FFMPEG_INSTALL_GUIDE.contains("Windows"));
        assert!(FFMPEG_INSTALL_GUIDE.contains("Linux"));
        assert!(FFMPEG_INSTALL_GUIDE.contains("ffmpeg.org"));
    }

    #[test]
    fn input_format_matches_sample_layout() {
        assert_eq!(input_format(&AudioSpec::new(8000, 1, 8)).unwrap(), "s8");
        assert_eq!(input_format(&AudioSpec::new(8000, 1, 24)).unwrap(), "s24le");
        assert_eq!(input_format(&AudioSpec::float(8000, 1)).unwrap(), "f32le");
        let mut odd = AudioSpec::new(8000, 1, 16);
        odd.bits_per_sample = 12;
        assert!(matches!(input_format(&odd), Err(AudioError::Unsupported(_))));
    }

    #[test]
    fn first_block_total_is_rewritten() {
        let mut block = Vec::new();
        block.extend_from_slice(BLOCK_MAGIC);
        block.extend_from_slice(&[0u8; BLOCK_HEADER_LEN - 4]);
        block.extend_from_slice(b"body");

        let memory = crate::audio::stream::MemoryBuffer::new();
        let mut stream = AudioStream::memory(memory.clone());
        let first = copy_blocks(&mut block.as_slice(), &mut stream, None).unwrap();
        assert_eq!(first, Some(0));

        let written = memory.to_vec();
        assert_eq!(written.len(), BLOCK_HEADER_LEN + 4);
        assert_eq!(written[11], 0);
        assert_eq!(&written[12..16], &u32::MAX.to_le_bytes());
        assert_eq!(&written[BLOCK_HEADER_LEN..], b"body");
    }

    #[test]
    fn foreign_output_is_rejected() {
        let mut stream = AudioStream::from_bytes(Vec::new());
        let mut empty: &[u8] = &[];
        assert_eq!(copy_blocks(&mut empty, &mut stream, None).unwrap(), None);

        let mut junk: &[u8] = &[0x55; 40];
        let err = copy_blocks(&mut junk, &mut stream, Some(5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
