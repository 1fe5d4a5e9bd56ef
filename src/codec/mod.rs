//! Run-length bitmap codec for layer mask data.

pub mod rle;

pub use rle::{pack_bits, pack_rows, unpack, Row, UnpackedImage, MAX_RUN_LENGTH, RUN_COLOR_BIT};
