//! 128-bit GUIDs as used by ASF to tag header objects, plus the
//! well-known values ASF readers/writers must recognise.

use byteorder::{ByteOrder, LittleEndian};

/// A 128-bit GUID, stored on disk as `u32 LE, u16 LE, u16 LE, 8 raw bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub u32, pub u16, pub u16, pub [u8; 8]);

impl Guid {
  pub const fn new(a: u32, b: u16, c: u16, d: [u8; 8]) -> Self {
    Guid(a, b, c, d)
  }

  /// Serialise to the 16-byte on-disk representation.
  pub fn to_bytes(self) -> [u8; 16] {
    let mut out = [0u8; 16];
    LittleEndian::write_u32(&mut out[0..4], self.0);
    LittleEndian::write_u16(&mut out[4..6], self.1);
    LittleEndian::write_u16(&mut out[6..8], self.2);
    out[8..16].copy_from_slice(&self.3);
    out
  }

  /// Parse from a 16-byte on-disk representation.
  pub fn from_bytes(bytes: &[u8; 16]) -> Self {
    let a = LittleEndian::read_u32(&bytes[0..4]);
    let b = LittleEndian::read_u16(&bytes[4..6]);
    let c = LittleEndian::read_u16(&bytes[6..8]);
    let mut d = [0u8; 8];
    d.copy_from_slice(&bytes[8..16]);
    Guid(a, b, c, d)
  }
}

/// A zero GUID, used as a stub/placeholder object id.
pub const MY_GUID: Guid = Guid::new(0, 0, 0, [0; 8]);

pub const ASF_HEADER: Guid = Guid::new(
  0x75B22630,
  0x668E,
  0x11CF,
  [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
);

pub const FILE_HEADER: Guid = Guid::new(
  0x8CABDCA1,
  0xA947,
  0x11CF,
  [0x8E, 0xE4, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);

pub const STREAM_HEADER: Guid = Guid::new(
  0xB7DC0791,
  0xA9B7,
  0x11CF,
  [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
);

pub const AUDIO_STREAM: Guid = Guid::new(
  0xF8699E40,
  0x5B4D,
  0x11CF,
  [0xA8, 0xFD, 0x00, 0x80, 0x5F, 0x5C, 0x44, 0x2B],
);

pub const VIDEO_STREAM: Guid = Guid::new(
  0xBC19EFC0,
  0x5B4D,
  0x11CF,
  [0xA8, 0xFD, 0x00, 0x80, 0x5F, 0x5C, 0x44, 0x2B],
);

pub const AUDIO_CONCEAL_NONE: Guid = Guid::new(
  0x49f1a440,
  0x4ece,
  0x11d0,
  [0xa3, 0xac, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6],
);

pub const VIDEO_CONCEAL_NONE: Guid = Guid::new(
  0x20fb5700,
  0x5b55,
  0x11cf,
  [0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b],
);

pub const COMMENT_HEADER: Guid = Guid::new(
  0x75b22633,
  0x668e,
  0x11cf,
  [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c],
);

pub const CODEC_COMMENT_HEADER: Guid = Guid::new(
  0x86D15240,
  0x311D,
  0x11D0,
  [0xA3, 0xA4, 0x00, 0xA0, 0xC9, 0x03, 0x48, 0xF6],
);

pub const CODEC_COMMENT1_HEADER: Guid = Guid::new(
  0x86d15241,
  0x311d,
  0x11d0,
  [0xa3, 0xa4, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6],
);

pub const DATA_HEADER: Guid = Guid::new(
  0x75b22636,
  0x668e,
  0x11cf,
  [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c],
);

pub const INDEX_GUID: Guid = Guid::new(
  0x33000890,
  0xe5b1,
  0x11cf,
  [0x89, 0xf4, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xcb],
);

pub const HEAD1_GUID: Guid = Guid::new(
  0x5fbf03b5,
  0xa92e,
  0x11cf,
  [0x8e, 0xe3, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65],
);

pub const HEAD2_GUID: Guid = Guid::new(
  0xabd3d211,
  0xa9ba,
  0x11cf,
  [0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65],
);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_bytes() {
    let bytes = ASF_HEADER.to_bytes();
    assert_eq!(Guid::from_bytes(&bytes), ASF_HEADER);
  }

  #[test]
  fn serialises_first_field_little_endian() {
    let bytes = FILE_HEADER.to_bytes();
    assert_eq!(
      u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
      0x8CABDCA1
    );
  }
}
