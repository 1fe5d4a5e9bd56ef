//! Continuous run-length encoding of a layer mask.
//!
//! Each byte encodes one run: bit 7 is the color (set = foreground, clear =
//! background) and bits 0–6 the run length (0–127). The stream is not row
//! delimited, so a run may continue from the end of row `n` into row `n + 1`.
//!
//! ```text
//!  7   6 ... 0
//! +---+-------+
//! | c |  len  |
//! +---+-------+
//! ```
//!
//! Zero-length runs carry no pixels and are skipped; the encoder never emits
//! them. A run that would end past `width × height` means the data is corrupt
//! and is reported as [`LayerError::MalformedRunLengthData`].

use crate::image::geom::Resolution;
use crate::utils::error::{LayerError, Result};
use bitvec::prelude::*;
use log::trace;

/// Bit marking a foreground run.
pub const RUN_COLOR_BIT: u8 = 0x80;

/// Longest run a single byte can encode.
pub const MAX_RUN_LENGTH: usize = 0x7F;

/// One unpacked mask row, bit `x` set when pixel `x` is foreground.
pub type Row = BitVec<u32, Lsb0>;

/// Decoded mask rows plus the foreground pixel count seen while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedImage {
    pub rows: Vec<Row>,
    pub pixels: u64,
}

impl UnpackedImage {
    /// An all-background image.
    pub fn blank(resolution: Resolution) -> Self {
        UnpackedImage {
            rows: blank_rows(resolution),
            pixels: 0,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.rows
            .get(y as usize)
            .and_then(|row| row.get(x as usize).map(|bit| *bit))
            .unwrap_or(false)
    }
}

fn blank_rows(resolution: Resolution) -> Vec<Row> {
    (0..resolution.height)
        .map(|_| bitvec![u32, Lsb0; 0; resolution.width as usize])
        .collect()
}

/// Decodes a run-length stream into `resolution.height` rows.
///
/// Data that ends early leaves the remaining pixels background.
pub fn unpack(data: &[u8], resolution: Resolution) -> Result<UnpackedImage> {
    let width = resolution.width as usize;
    let total = resolution.pixel_count();
    let mut rows = blank_rows(resolution);
    let mut pixels = 0u64;
    let mut pos = 0usize;

    for (index, &rle) in data.iter().enumerate() {
        let length = (rle & MAX_RUN_LENGTH as u8) as usize;
        let color = rle & RUN_COLOR_BIT != 0;

        if length == 0 {
            trace!("Skipping zero-length run at byte {}", index);
            continue;
        }

        let end = pos + length;
        if end > total {
            return Err(LayerError::MalformedRunLengthData(format!(
                "run at byte {} ends at pixel {}, beyond the {}x{} image",
                index, end, resolution.width, resolution.height
            )));
        }

        if color {
            pixels += length as u64;
            let mut start = pos;
            while start < end {
                let y = start / width;
                let x = start % width;
                let row_end = ((y + 1) * width).min(end);
                rows[y][x..x + (row_end - start)].fill(true);
                start = row_end;
            }
        }
        pos = end;
    }

    Ok(UnpackedImage { rows, pixels })
}

/// Encodes a raster-order stream of foreground bits.
///
/// A new run starts every time the bit changes; runs longer than
/// [`MAX_RUN_LENGTH`] are split over several bytes.
pub fn pack_bits<I>(bits: I) -> Vec<u8>
where
    I: IntoIterator<Item = bool>,
{
    let mut out = Vec::new();
    let mut current: Option<bool> = None;
    let mut length = 0usize;

    for bit in bits {
        match current {
            Some(color) if color == bit => length += 1,
            _ => {
                if let Some(color) = current {
                    emit_run(&mut out, color, length);
                }
                current = Some(bit);
                length = 1;
            }
        }
    }
    if let Some(color) = current {
        emit_run(&mut out, color, length);
    }
    out
}

/// Encodes unpacked rows, treating missing rows or columns as background.
pub fn pack_rows(rows: &[Row], resolution: Resolution) -> Vec<u8> {
    let width = resolution.width as usize;
    pack_bits((0..resolution.height as usize).flat_map(move |y| {
        let row = rows.get(y);
        (0..width).map(move |x| row.and_then(|r| r.get(x).map(|bit| *bit)).unwrap_or(false))
    }))
}

fn emit_run(out: &mut Vec<u8>, color: bool, mut length: usize) {
    let flag = if color { RUN_COLOR_BIT } else { 0 };
    while length > 0 {
        let n = length.min(MAX_RUN_LENGTH);
        out.push(flag | n as u8);
        length -= n;
    }
}
