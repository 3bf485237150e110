//! Codec identity and the fourcc/tag tables that map a library-internal
//! [`CodecId`] to the on-disk tag a given container format expects.
//!
//! Every table here is a flat, ordered list of `(CodecId, tag)` pairs.
//! Ordering is part of the contract: on write, the **first** entry whose
//! id matches is authoritative (some ids have more than one valid tag,
//! e.g. MS-ADPCM variants reusing a tag across vendors); on read, the
//! first entry whose tag matches determines the id.

/// Stream media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
  Audio,
  Video,
  Unknown,
}

/// Library-internal codec identity. Deliberately small: only the ids
/// this crate's containers actually need to tag, since codec
/// implementations themselves are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
  None,
  // Audio
  PcmS16Le,
  PcmU8,
  PcmAlaw,
  PcmMulaw,
  Mp2,
  Ac3,
  Vorbis,
  Aac,
  // Video
  Mpeg1Video,
  Mpeg2Video,
  H263,
  Mjpeg,
  RawVideo,
  Msmpeg4V3,
  Gif,
}

impl CodecId {
  pub fn codec_type(&self) -> CodecType {
    match self {
      CodecId::None => CodecType::Unknown,
      CodecId::PcmS16Le
      | CodecId::PcmU8
      | CodecId::PcmAlaw
      | CodecId::PcmMulaw
      | CodecId::Mp2
      | CodecId::Ac3
      | CodecId::Vorbis
      | CodecId::Aac => CodecType::Audio,
      CodecId::Mpeg1Video
      | CodecId::Mpeg2Video
      | CodecId::H263
      | CodecId::Mjpeg
      | CodecId::RawVideo
      | CodecId::Msmpeg4V3
      | CodecId::Gif => CodecType::Video,
    }
  }
}

/// `(codec_id, fourcc)` pair. `fourcc` for BMP/AVI/MOV is a little-endian
/// packed four-ASCII-byte code; for WAV/AU it is the on-disk format tag
/// widened to `u32`.
pub type CodecTag = (CodecId, u32);

/// Pack four ASCII bytes into a little-endian `u32` fourcc, the same
/// convention AVI/BMP/MOV fourccs use on disk.
pub const fn fourcc(bytes: [u8; 4]) -> u32 {
  (bytes[0] as u32) | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16 | (bytes[3] as u32) << 24
}

/// BMP/AVI video fourcc table (`strf` / `biCompression`).
pub static CODEC_BMP_TAGS: &[CodecTag] = &[
  (CodecId::H263, fourcc(*b"H263")),
  (CodecId::H263, fourcc(*b"U263")),
  (CodecId::Mjpeg, fourcc(*b"MJPG")),
  (CodecId::Mjpeg, fourcc(*b"mjpg")),
  (CodecId::Mpeg1Video, fourcc(*b"PIM1")),
  (CodecId::Msmpeg4V3, fourcc(*b"MP43")),
  (CodecId::RawVideo, fourcc(*b"RGB ")),
  (CodecId::RawVideo, 0),
];

/// WAV `fmt ` format-tag table (`wFormatTag`, widened to `u32`).
pub static CODEC_WAV_TAGS: &[CodecTag] = &[
  (CodecId::PcmS16Le, 0x0001),
  (CodecId::PcmU8, 0x0001), // tag 1 is shared; bits/sample disambiguates, see wav_codec_get_id
  (CodecId::Mp2, 0x0050),
  (CodecId::Ac3, 0x2000),
  (CodecId::Aac, 0x00ff),
  (CodecId::PcmAlaw, 0x0006),
  (CodecId::PcmMulaw, 0x0007),
];

/// AU (Sun/NeXT `.snd`) format-tag table.
pub static CODEC_AU_TAGS: &[CodecTag] = &[
  (CodecId::PcmMulaw, 1),
  (CodecId::PcmS16Le, 3),
  (CodecId::PcmU8, 2),
  (CodecId::PcmAlaw, 27),
];

/// MOV/MP4 video sample-description fourcc table.
pub static CODEC_MOV_VIDEO_TAGS: &[CodecTag] = &[
  (CodecId::Mpeg1Video, fourcc(*b"mp1v")),
  (CodecId::Mjpeg, fourcc(*b"mjpa")),
  (CodecId::Mjpeg, fourcc(*b"jpeg")),
  (CodecId::RawVideo, fourcc(*b"raw ")),
  (CodecId::H263, fourcc(*b"h263")),
];

/// MOV/MP4 audio sample-description fourcc table.
pub static CODEC_MOV_AUDIO_TAGS: &[CodecTag] = &[
  (CodecId::PcmS16Le, fourcc(*b"twos")),
  (CodecId::PcmU8, fourcc(*b"raw ")),
  (CodecId::Mp2, fourcc(*b".mp2")),
  (CodecId::Ac3, fourcc(*b"ac-3")),
  (CodecId::Aac, fourcc(*b"mp4a")),
];

/// Look up the on-disk tag for `id`: the first matching entry's tag.
pub fn get_tag(table: &[CodecTag], id: CodecId) -> Option<u32> {
  table.iter().find(|(tid, _)| *tid == id).map(|(_, tag)| *tag)
}

/// Look up the codec id for an on-disk `tag`: the first matching entry's id.
pub fn get_id(table: &[CodecTag], tag: u32) -> CodecId {
  table
    .iter()
    .find(|(_, ttag)| *ttag == tag)
    .map(|(id, _)| *id)
    .unwrap_or(CodecId::None)
}

/// WAV needs bits-per-sample to disambiguate format tag `1` (uncompressed
/// PCM) between 8-bit unsigned and 16-bit signed little-endian.
pub fn wav_codec_get_id(tag: u32, bits_per_sample: u16) -> CodecId {
  if tag == 0x0001 {
    return match bits_per_sample {
      8 => CodecId::PcmU8,
      16 => CodecId::PcmS16Le,
      _ => CodecId::None,
    };
  }
  get_id(CODEC_WAV_TAGS, tag)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fourcc_packs_little_endian() {
    assert_eq!(fourcc(*b"MJPG"), 0x47504a4d);
  }

  #[test]
  fn bmp_tag_bijection_on_first_occurrence() {
    // H263 appears twice; get_tag must return the *first* entry's tag.
    assert_eq!(get_tag(CODEC_BMP_TAGS, CodecId::H263), Some(fourcc(*b"H263")));
    // Every tag present maps back to the id it was looked up from.
    for &(id, tag) in CODEC_BMP_TAGS {
      assert_eq!(get_id(CODEC_BMP_TAGS, tag), id);
    }
  }

  #[test]
  fn wav_tag_1_disambiguated_by_bits_per_sample() {
    assert_eq!(wav_codec_get_id(1, 8), CodecId::PcmU8);
    assert_eq!(wav_codec_get_id(1, 16), CodecId::PcmS16Le);
  }

  #[test]
  fn au_table_round_trips() {
    for &(id, tag) in CODEC_AU_TAGS {
      assert_eq!(get_id(CODEC_AU_TAGS, tag), id);
      assert_eq!(get_tag(CODEC_AU_TAGS, id), Some(tag));
    }
  }
}
