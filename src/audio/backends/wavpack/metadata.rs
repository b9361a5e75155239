//! 块内元数据子块
//!
//! 每个子块为 `id` + 长度（以16位字为单位）+ 数据，数据按偶数字节对齐。

use crate::error::{self, AudioResult};

pub const ID_UNIQUE: u8 = 0x3f;
pub const ID_OPTIONAL_DATA: u8 = 0x20;
pub const ID_ODD_SIZE: u8 = 0x40;
pub const ID_LARGE: u8 = 0x80;

pub const ID_WV_BITSTREAM: u8 = 0xa;
pub const ID_CHANNEL_INFO: u8 = 0xd;
pub const ID_SAMPLE_RATE: u8 = ID_OPTIONAL_DATA | 0x7;

/// 一个已切分的子块
#[derive(Debug, Clone, Copy)]
pub struct SubBlock<'a> {
    /// 去掉 ODD_SIZE/LARGE 位后的标识
    pub id: u8,
    pub data: &'a [u8],
}

impl SubBlock<'_> {
    pub fn function(&self) -> u8 {
        self.id & ID_UNIQUE
    }
}

/// 把块体切分为子块序列
pub fn parse_sub_blocks(body: &[u8]) -> AudioResult<Vec<SubBlock<'_>>> {
    let mut blocks = Vec::new();
    let mut pos = 0usize;

    while pos < body.len() {
        if body.len() - pos < 2 {
            return Err(error::corrupt("WavPack元数据子块头被截断"));
        }
        let raw_id = body[pos];
        let (word_count, header_len) = if raw_id & ID_LARGE != 0 {
            if body.len() - pos < 4 {
                return Err(error::corrupt("WavPack元数据子块头被截断"));
            }
            let words = body[pos + 1] as usize
                | (body[pos + 2] as usize) << 8
                | (body[pos + 3] as usize) << 16;
            (words, 4)
        } else {
            (body[pos + 1] as usize, 2)
        };

        let padded_len = word_count * 2;
        let data_start = pos + header_len;
        if body.len() - data_start < padded_len {
            return Err(error::corrupt(format!(
                "WavPack元数据子块0x{raw_id:02x}长度越界"
            )));
        }
        let data_len = if raw_id & ID_ODD_SIZE != 0 && padded_len > 0 {
            padded_len - 1
        } else {
            padded_len
        };

        blocks.push(SubBlock {
            id: raw_id & !(ID_LARGE | ID_ODD_SIZE),
            data: &body[data_start..data_start + data_len],
        });
        pos = data_start + padded_len;
    }

    Ok(blocks)
}

/// 追加一个子块，自动处理奇数长度与大块标志
pub fn write_sub_block(out: &mut Vec<u8>, id: u8, data: &[u8]) {
    let odd = data.len() % 2 == 1;
    let words = data.len().div_ceil(2);
    let mut raw_id = id;
    if odd {
        raw_id |= ID_ODD_SIZE;
    }

    if words > 0xff {
        out.push(raw_id | ID_LARGE);
        out.push(words as u8);
        out.push((words >> 8) as u8);
        out.push((words >> 16) as u8);
    } else {
        out.push(raw_id);
        out.push(words as u8);
    }

    out.extend_from_slice(data);
    if odd {
        out.push(0);
    }
}
