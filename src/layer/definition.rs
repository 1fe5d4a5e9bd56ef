//! The fixed-size layer definition record of the layer table.
//!
//! ```text
//! offset  size  field
//!      0     4  z position (f32)
//!      4     4  exposure seconds (f32)
//!      8     4  off time seconds (f32)
//!     12     4  data address (u32)
//!     16     4  data size (u32)
//!     20    16  reserved (4 × u32)
//! ```
//!
//! All fields are little-endian.

use std::io::{Read, Write};
use std::ops::Range;

use crate::utils::error::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Size in bytes of one record.
pub const LAYER_DEFINITION_SIZE: usize = 36;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LayerDefinition {
    pub position_z: f32,
    pub exposure: f32,
    pub off_time: f32,
    pub data_address: u32,
    pub data_size: u32,
    pub reserved: [u32; 4],
}

impl LayerDefinition {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let position_z = reader.read_f32::<LittleEndian>()?;
        let exposure = reader.read_f32::<LittleEndian>()?;
        let off_time = reader.read_f32::<LittleEndian>()?;
        let data_address = reader.read_u32::<LittleEndian>()?;
        let data_size = reader.read_u32::<LittleEndian>()?;
        let mut reserved = [0u32; 4];
        reader.read_u32_into::<LittleEndian>(&mut reserved)?;
        Ok(LayerDefinition {
            position_z,
            exposure,
            off_time,
            data_address,
            data_size,
            reserved,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_f32::<LittleEndian>(self.position_z)?;
        writer.write_f32::<LittleEndian>(self.exposure)?;
        writer.write_f32::<LittleEndian>(self.off_time)?;
        writer.write_u32::<LittleEndian>(self.data_address)?;
        writer.write_u32::<LittleEndian>(self.data_size)?;
        for value in self.reserved {
            writer.write_u32::<LittleEndian>(value)?;
        }
        Ok(())
    }

    /// Byte range of the layer's run-length data in the whole file.
    pub fn data_range(&self) -> Range<usize> {
        let start = self.data_address as usize;
        start..start + self.data_size as usize
    }
}
