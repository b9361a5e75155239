//! WavPack块头（32字节）与标志位

use crate::error::{self, AudioResult};

pub const BLOCK_HEADER_LEN: usize = 32;
pub const BLOCK_MAGIC: &[u8; 4] = b"wvpk";

/// 写出的流版本
pub const STREAM_VERSION: u16 = 0x407;
/// 可解码的流版本范围
pub const MIN_STREAM_VERSION: u16 = 0x402;
pub const MAX_STREAM_VERSION: u16 = 0x410;

/// 单个块允许的最大字节数
pub const MAX_BLOCK_BYTES: u32 = 1 << 24;
/// 单个块允许的最大帧数，与FFmpeg的WavPack解码器一致
pub const MAX_BLOCK_SAMPLES: u32 = 150_000;

// ==================== 标志位 ====================

pub const BYTES_STORED: u32 = 3;
pub const MONO_FLAG: u32 = 4;
pub const FLOAT_DATA: u32 = 0x80;
pub const INITIAL_BLOCK: u32 = 0x800;
pub const FINAL_BLOCK: u32 = 0x1000;
pub const SRATE_LSB: u32 = 23;
pub const SRATE_MASK: u32 = 0xf << SRATE_LSB;
pub const DSD_FLAG: u32 = 0x8000_0000;

/// 采样率索引表；索引15表示自定义采样率（见 `ID_SAMPLE_RATE` 元数据）
pub const SAMPLE_RATES: [u32; 15] = [
    6000, 8000, 9600, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000,
    192000,
];
pub const CUSTOM_RATE_INDEX: u32 = 15;

/// 采样率在索引表中的位置，不在表中时返回自定义索引
pub fn sample_rate_index(rate: u32) -> u32 {
    SAMPLE_RATES
        .iter()
        .position(|&r| r == rate)
        .map_or(CUSTOM_RATE_INDEX, |i| i as u32)
}

/// 总样本数字段中的"未知"标记
const UNKNOWN_TOTAL: u32 = u32::MAX;

/// 解析后的块头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// 块大小减去8字节（RIFF风格）
    pub ck_size: u32,
    pub version: u16,
    pub total_samples: Option<u64>,
    pub block_index: u64,
    pub block_samples: u32,
    pub flags: u32,
    pub crc: u32,
}

impl BlockHeader {
    pub fn parse(raw: &[u8; BLOCK_HEADER_LEN]) -> AudioResult<Self> {
        if &raw[0..4] != BLOCK_MAGIC {
            return Err(error::corrupt("WavPack块缺少wvpk标记"));
        }

        let u32_at = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);

        let ck_size = u32_at(4);
        let version = u16::from_le_bytes([raw[8], raw[9]]);
        let block_index_u8 = raw[10] as u64;
        let total_samples_u8 = raw[11] as u64;
        let total_samples = u32_at(12);
        let block_index = u32_at(16) as u64 + (block_index_u8 << 32);

        if !(MIN_STREAM_VERSION..=MAX_STREAM_VERSION).contains(&version) {
            return Err(error::unsupported(format!(
                "WavPack流版本0x{version:x}超出支持范围"
            )));
        }
        if ck_size < (BLOCK_HEADER_LEN - 8) as u32 || ck_size > MAX_BLOCK_BYTES {
            return Err(error::corrupt(format!("WavPack块大小异常: {ck_size}")));
        }

        let block_samples = u32_at(20);
        if block_samples > MAX_BLOCK_SAMPLES {
            return Err(error::corrupt(format!(
                "WavPack块帧数({block_samples})超出上限({MAX_BLOCK_SAMPLES})"
            )));
        }

        // 超过 2^32-1 的总数按 u8 * 0xffffffff + u32 的方式分拆存储
        let total_samples = if total_samples == UNKNOWN_TOTAL {
            None
        } else {
            Some(total_samples as u64 + (total_samples_u8 << 32) - total_samples_u8)
        };

        Ok(Self {
            ck_size,
            version,
            total_samples,
            block_index,
            block_samples,
            flags: u32_at(24),
            crc: u32_at(28),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let (total_u8, total) = split_total(self.total_samples);
        out.extend_from_slice(BLOCK_MAGIC);
        out.extend_from_slice(&self.ck_size.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push((self.block_index >> 32) as u8);
        out.push(total_u8);
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&(self.block_index as u32).to_le_bytes());
        out.extend_from_slice(&self.block_samples.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.crc.to_le_bytes());
    }

    /// 块体（头部之后）的字节数
    pub fn body_len(&self) -> usize {
        self.ck_size as usize + 8 - BLOCK_HEADER_LEN
    }

    /// 每个样本存储的字节数（1..=4）
    pub fn bytes_per_sample(&self) -> u32 {
        (self.flags & BYTES_STORED) + 1
    }

    /// 解码后输出的声道数（伪立体声展开为2）
    pub fn output_channels(&self) -> usize {
        if self.flags & MONO_FLAG != 0 { 1 } else { 2 }
    }

    pub fn rate_index(&self) -> u32 {
        (self.flags & SRATE_MASK) >> SRATE_LSB
    }

    pub fn is_initial(&self) -> bool {
        self.flags & INITIAL_BLOCK != 0
    }

    pub fn is_final(&self) -> bool {
        self.flags & FINAL_BLOCK != 0
    }

    pub fn is_float(&self) -> bool {
        self.flags & FLOAT_DATA != 0
    }

    /// 本库不处理的子特性
    pub fn check_supported(&self) -> AudioResult<()> {
        if self.flags & DSD_FLAG != 0 {
            return Err(error::unsupported("WavPack DSD音频"));
        }
        if self.is_float() && self.bytes_per_sample() != 4 {
            return Err(error::unsupported(format!(
                "WavPack {}位浮点",
                self.bytes_per_sample() * 8
            )));
        }
        Ok(())
    }
}

/// 把总样本数拆分为 (u8高位, u32低位)
pub fn split_total(total: Option<u64>) -> (u8, u32) {
    match total {
        None => (0, UNKNOWN_TOTAL),
        Some(total) if total < UNKNOWN_TOTAL as u64 => (0, total as u32),
        Some(total) => {
            let high = total / UNKNOWN_TOTAL as u64;
            ((high as u8), (total % UNKNOWN_TOTAL as u64) as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(total: Option<u64>) -> BlockHeader {
        BlockHeader {
            ck_size: 100,
            version: STREAM_VERSION,
            total_samples: total,
            block_index: 44100,
            block_samples: 22050,
            flags: 1 | INITIAL_BLOCK | FINAL_BLOCK | (9 << SRATE_LSB),
            crc: 0xdead_beef,
        }
    }

    #[test]
    fn header_round_trip() {
        for total in [None, Some(0), Some(88200), Some(u32::MAX as u64 + 10)] {
            let header = sample_header(total);
            let mut raw = Vec::new();
            header.write(&mut raw);
            let raw: [u8; BLOCK_HEADER_LEN] = raw.try_into().unwrap();
            assert_eq!(BlockHeader::parse(&raw).unwrap(), header);
        }
    }

    #[test]
    fn derived_fields() {
        let header = sample_header(Some(10));
        assert_eq!(header.bytes_per_sample(), 2);
        assert_eq!(header.output_channels(), 2);
        assert!(!header.is_float());
        assert_eq!(SAMPLE_RATES[header.rate_index() as usize], 44100);
        assert_eq!(sample_rate_index(384_000), CUSTOM_RATE_INDEX);
        assert_eq!(header.body_len(), 76);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut raw = Vec::new();
        sample_header(None).write(&mut raw);
        let mut bad_magic: [u8; BLOCK_HEADER_LEN] = raw.clone().try_into().unwrap();
        bad_magic[0] = b'x';
        assert!(BlockHeader::parse(&bad_magic).is_err());

        let mut bad_version: [u8; BLOCK_HEADER_LEN] = raw.try_into().unwrap();
        bad_version[8] = 0x00;
        bad_version[9] = 0x03;
        assert!(matches!(
            BlockHeader::parse(&bad_version),
            Err(crate::error::AudioError::Unsupported(_))
        ));
    }

    #[test]
    fn oversized_block_samples_is_corrupt() {
        let mut header = sample_header(Some(10));
        header.block_samples = MAX_BLOCK_SAMPLES;
        let mut raw = Vec::new();
        header.write(&mut raw);
        let mut raw: [u8; BLOCK_HEADER_LEN] = raw.try_into().unwrap();
        assert!(BlockHeader::parse(&raw).is_ok());

        raw[20..24].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            BlockHeader::parse(&raw),
            Err(crate::error::AudioError::CorruptData(_))
        ));
    }

    #[test]
    fn dsd_and_short_float_are_unsupported() {
        let mut header = sample_header(None);
        header.flags |= DSD_FLAG;
        assert!(header.check_supported().is_err());

        let mut header = sample_header(None);
        header.flags |= FLOAT_DATA;
        assert!(header.check_supported().is_err());
        header.flags |= BYTES_STORED;
        assert!(header.check_supported().is_ok());
        assert!(header.is_float());
    }
}
