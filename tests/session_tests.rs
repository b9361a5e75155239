//! 会话端到端测试
//!
//! 覆盖会话状态机的典型场景：完整读取、头部损坏、后端未编译、
//! 参数错误、失败粘滞以及重复收尾。

mod audio_test_fixtures;

use audio_test_fixtures::{log, test_signal, two_second_stereo_wav};
use audioport::{
    AudioError, AudioSpec, AudioStream, CallbackSource, DecodeOptions, DecodeSession,
    EncodeSession, FormatHint, FormatTag, MemoryBuffer, SampleBuffer, SessionState,
};
use std::io::{self, Cursor, Read};

// ========== 场景1：完整读取WAV ==========

#[cfg(feature = "wav")]
#[test]
fn test_two_second_wav_reads_in_two_chunks() {
    log("2秒WAV分两次读取", "Two-second WAV read in two chunks");

    let stream = AudioStream::from_bytes(two_second_stereo_wav().to_vec());
    let mut session = DecodeSession::open(stream, DecodeOptions::default()).unwrap();

    assert_eq!(session.format(), FormatTag::Wav);
    let spec = *session.spec();
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.total_frames, Some(88_200));

    let first = session.read_frames(44_100).unwrap();
    let second = session.read_frames(44_100).unwrap();
    assert_eq!(first.frames() + second.frames(), 88_200);
    assert_eq!(first.samples().len(), 44_100 * 2);

    let terminal = session.read_frames(44_100).unwrap();
    assert!(terminal.is_empty(), "流末尾应返回空缓冲区 / End of stream must be an empty buffer");
    assert!(matches!(session.state(), SessionState::Finalized));
    assert_eq!(session.frames_read(), 88_200);

    // 空缓冲区只出现一次
    assert!(matches!(
        session.read_frames(1),
        Err(AudioError::InvalidArgument(_))
    ));
}

// ========== 场景2：FLAC标记损坏 ==========

#[cfg(feature = "flac")]
#[test]
fn test_corrupted_flac_marker_is_malformed() {
    log("损坏的FLAC流标记", "Corrupted FLAC stream marker");

    let samples = test_signal(1000, 1, 16);
    let mut bytes = audio_test_fixtures::flac_bytes(44_100, 1, 16, &samples);
    bytes[0..4].copy_from_slice(b"fLaX");

    let options = DecodeOptions::default().with_hint(FormatHint::Extension("flac".to_string()));
    let result = DecodeSession::open(AudioStream::from_bytes(bytes), options);
    match result {
        Err(AudioError::Malformed(msg)) => log(format!("得到Malformed: {msg}"), "Got Malformed"),
        Err(e) => panic!("应该返回Malformed，得到 {e:?} / Expected Malformed"),
        Ok(_) => panic!("损坏的FLAC不应产生音频规格 / Corrupted FLAC must not yield a spec"),
    }
}

// ========== 场景3：WavPack后端未编译 ==========

#[cfg(not(feature = "wavpack"))]
#[test]
fn test_wavpack_without_backend_is_unsupported_format() {
    log("WavPack后端未编译", "WavPack backend compiled out");

    let mut bytes = b"wvpk".to_vec();
    bytes.extend_from_slice(&[0u8; 60]);
    let result = DecodeSession::open(AudioStream::from_bytes(bytes), DecodeOptions::default());
    assert!(matches!(result, Err(AudioError::UnsupportedFormat(_))));
}

#[cfg(feature = "wavpack")]
#[test]
fn test_wavpack_absurd_block_length_is_corrupt() {
    log("WavPack块帧数异常", "WavPack block length out of range");

    let mut bytes = b"wvpk".to_vec();
    bytes.extend_from_slice(&24u32.to_le_bytes());
    bytes.extend_from_slice(&0x410u16.to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&10u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);

    // 块头校验先于FFmpeg查找，无需FFmpeg
    let result = DecodeSession::open(AudioStream::from_bytes(bytes), DecodeOptions::default());
    assert!(matches!(result, Err(AudioError::CorruptData(_))), "{:?}", result.err());
}

// ========== 场景4：样本数不是声道数的整数倍 ==========

#[test]
fn test_non_multiple_buffer_is_invalid_argument() {
    log("样本数不是声道数的整数倍", "Sample count not a multiple of channel count");

    let memory = MemoryBuffer::new();
    let spec = AudioSpec::new(44_100, 2, 16);
    let mut session =
        EncodeSession::create(AudioStream::memory(memory.clone()), FormatTag::Raw, spec).unwrap();

    // 1000帧立体声少了一个样本
    let samples = vec![0.25f32; 1999];
    assert!(matches!(
        session.write_interleaved(&samples),
        Err(AudioError::InvalidArgument(_))
    ));
    assert!(matches!(
        SampleBuffer::from_interleaved(2, samples),
        Err(AudioError::InvalidArgument(_))
    ));

    // 参数错误不会让会话失败
    assert!(session.state().is_active());
    session.write_interleaved(&vec![0.25f32; 2000]).unwrap();
    session.finalize().unwrap();
    assert_eq!(session.frames_written(), 1000);
    assert_eq!(memory.len(), 4000);
}

// ========== 状态机 ==========

#[test]
fn test_failed_session_is_sticky() {
    log("失败状态粘滞", "Failed state is sticky");

    // 前64字节正常，之后读取失败
    let mut cursor = Cursor::new(vec![0u8; 64]);
    let mut served = 0usize;
    let source = CallbackSource::new().with_read(move |buf| {
        if served >= 64 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "模拟的读取失败"));
        }
        let n = cursor.read(buf)?;
        served += n;
        Ok(n)
    });

    let spec = AudioSpec::new(8000, 1, 16);
    let mut session = DecodeSession::open(AudioStream::custom(source), DecodeOptions::raw(spec)).unwrap();

    let first = session.read_frames(32).unwrap();
    assert_eq!(first.frames(), 32);

    let err = session.read_frames(32).unwrap_err();
    assert!(matches!(err, AudioError::Io(_)));
    assert!(matches!(session.state(), SessionState::Failed(_)));

    // 之后每次都返回同一个原始错误
    for _ in 0..3 {
        match (session.read_frames(32), &err) {
            (Err(AudioError::Io(again)), AudioError::Io(original)) => {
                assert!(std::sync::Arc::ptr_eq(&again, original));
            }
            (other, _) => panic!("应该重复返回原始I/O错误: {:?}", other.err()),
        }
    }
    assert!(matches!(session.seek_to_frame(0), Err(AudioError::Io(_))));
}

#[cfg(feature = "wav")]
#[test]
fn test_unbounded_read_returns_whole_file() {
    log("不限帧数读取整个文件", "Unbounded read returns the whole file");

    let stream = AudioStream::from_bytes(two_second_stereo_wav().to_vec());
    let mut session = DecodeSession::open(stream, DecodeOptions::default()).unwrap();

    let all = session.read_frames(usize::MAX).unwrap();
    assert_eq!(all.frames(), 88_200);
    assert!(session.read_frames(usize::MAX).unwrap().is_empty());
    assert!(matches!(session.state(), SessionState::Finalized));
}

#[cfg(feature = "wav")]
#[test]
fn test_seek_on_read_only_stream_keeps_session_active() {
    log("只读流定位被拒绝", "Seek on a read-only stream is refused");

    let mut cursor = Cursor::new(two_second_stereo_wav().to_vec());
    let source = CallbackSource::new().with_read(move |buf| cursor.read(buf));
    let mut session = DecodeSession::open(AudioStream::custom(source), DecodeOptions::default()).unwrap();

    let first = session.read_frames(100).unwrap();
    assert!(matches!(
        session.seek_to_frame(0),
        Err(AudioError::Unsupported(_))
    ));
    assert!(session.state().is_active());
    assert_eq!(session.frames_read(), 100);

    // 继续顺序读取，数据接在第100帧之后
    let next = session.read_frames(100).unwrap();
    assert_eq!(next.frames(), 100);
    assert_ne!(first.samples(), next.samples());
    assert_eq!(session.frames_read(), 200);
}

#[test]
fn test_unwritable_stream_is_rejected() {
    let source = CallbackSource::new().with_read(|_| Ok(0));
    let result = EncodeSession::create(
        AudioStream::custom(source),
        FormatTag::Raw,
        AudioSpec::new(44_100, 2, 16),
    );
    assert!(matches!(result, Err(AudioError::InvalidArgument(_))));
}

#[test]
fn test_empty_stream_is_detection_failure() {
    log("空流检测失败", "Empty stream fails detection");

    let result = DecodeSession::open(AudioStream::from_bytes(Vec::new()), DecodeOptions::default());
    assert!(matches!(result, Err(AudioError::DetectionFailed(_))));

    let result = DecodeSession::open(AudioStream::from_bytes(b"RIFF".to_vec()), DecodeOptions::default());
    assert!(matches!(result, Err(AudioError::DetectionFailed(_))));
}

#[test]
fn test_decoders_and_encoders_are_unsupported_where_expected() {
    let spec = AudioSpec::new(44_100, 2, 16);
    for tag in [FormatTag::Flac, FormatTag::Mp3] {
        let result = EncodeSession::create(AudioStream::memory(MemoryBuffer::new()), tag, spec);
        match result {
            Err(AudioError::Unsupported(_)) => assert!(tag.is_enabled()),
            Err(AudioError::UnsupportedFormat(_)) => assert!(!tag.is_enabled()),
            Err(e) => panic!("{tag}编码应该不受支持: {e:?}"),
            Ok(_) => panic!("{tag}编码应该不受支持"),
        }
    }

    let result = EncodeSession::create(
        AudioStream::memory(MemoryBuffer::new()),
        FormatTag::Unknown,
        spec,
    );
    assert!(matches!(result, Err(AudioError::UnsupportedFormat(_))));
}

#[cfg(feature = "wav")]
#[test]
fn test_finalize_twice_does_not_touch_output() {
    log("重复finalize", "Finalize called twice");

    let memory = MemoryBuffer::new();
    let spec = AudioSpec::new(22_050, 1, 24);
    let mut session =
        EncodeSession::create(AudioStream::memory(memory.clone()), FormatTag::Wav, spec).unwrap();
    session
        .write_interleaved(&audio_test_fixtures::normalize(&test_signal(500, 1, 24), 24))
        .unwrap();
    session.finalize().unwrap();
    let first = memory.to_vec();

    assert!(matches!(
        session.finalize(),
        Err(AudioError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.write_interleaved(&[0.0]),
        Err(AudioError::InvalidArgument(_))
    ));
    assert!(matches!(session.state(), SessionState::Finalized));
    assert_eq!(memory.to_vec(), first);

    let mut decoded = DecodeSession::open(AudioStream::from_bytes(first), DecodeOptions::default()).unwrap();
    assert_eq!(decoded.spec().total_frames, Some(500));
    assert_eq!(decoded.read_all().unwrap().frames(), 500);
}

#[cfg(feature = "wav")]
#[test]
fn test_wav_needs_seekable_output() {
    let sink = CallbackSource::new().with_write(|buf| Ok(buf.len()));
    let result = EncodeSession::create(
        AudioStream::custom(sink),
        FormatTag::Wav,
        AudioSpec::new(44_100, 2, 16),
    );
    assert!(matches!(result, Err(AudioError::Unsupported(_))));
}

#[cfg(feature = "wav")]
#[test]
fn test_seek_matches_linear_read() {
    log("定位与顺序读取一致", "Seek matches linear read");

    let bytes = two_second_stereo_wav().to_vec();
    let mut linear = DecodeSession::open(AudioStream::from_bytes(bytes.clone()), DecodeOptions::default()).unwrap();
    let all = linear.read_all().unwrap();

    let mut session = DecodeSession::open(AudioStream::from_bytes(bytes), DecodeOptions::default()).unwrap();
    session.seek_to_frame(30_000).unwrap();
    assert_eq!(session.frames_read(), 30_000);
    let chunk = session.read_frames(1000).unwrap();
    assert_eq!(chunk.samples(), &all.samples()[60_000..62_000]);

    // 越界定位是参数错误，会话保持可用
    assert!(matches!(
        session.seek_to_frame(1_000_000),
        Err(AudioError::InvalidArgument(_))
    ));
    assert!(session.state().is_active());
}

#[cfg(feature = "wav")]
#[test]
fn test_extension_hint_does_not_override_magic() {
    let options = DecodeOptions::default().with_hint(FormatHint::Extension("mp3".to_string()));
    let session = DecodeSession::open(AudioStream::from_bytes(two_second_stereo_wav().to_vec()), options).unwrap();
    assert_eq!(session.format(), FormatTag::Wav);
}

#[test]
fn test_sessions_run_independently_on_threads() {
    log("多线程独立会话", "Independent sessions on separate threads");

    let handles: Vec<_> = (1..=4u16)
        .map(|channels| {
            std::thread::spawn(move || {
                let spec = AudioSpec::new(16_000, channels, 16);
                let memory = MemoryBuffer::new();
                let samples = audio_test_fixtures::normalize(&test_signal(800, channels, 16), 16);
                let mut encoder =
                    EncodeSession::create(AudioStream::memory(memory.clone()), FormatTag::Raw, spec).unwrap();
                encoder.write_interleaved(&samples).unwrap();
                encoder.close().unwrap();

                let mut decoder =
                    DecodeSession::open(AudioStream::memory(memory), DecodeOptions::raw(spec)).unwrap();
                let decoded = decoder.read_all().unwrap();
                assert_eq!(decoded.samples(), samples.as_slice());
                decoded.frames()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 800);
    }
}
