//! Per-stream codec parameters and the format-agnostic [`Stream`] record
//! that demuxers populate and muxers consume.

use crate::codectags::{CodecId, CodecType};
use crate::rational::{Rational, FRAME_RATE_BASE};

/// Parameters describing how a single elementary stream's samples/frames
/// are encoded, independent of the container carrying them.
#[derive(Debug, Clone)]
pub struct CodecParameters {
  pub codec_type: CodecType,
  pub codec_id: CodecId,
  /// The on-disk tag this stream was read with (or will be written with),
  /// e.g. a BMP fourcc or a WAV `wFormatTag`. `0` if not yet resolved.
  pub codec_tag: u32,
  pub bit_rate: i64,

  // Video
  pub width: u32,
  pub height: u32,
  /// Frame rate as `numerator / FRAME_RATE_BASE`.
  pub frame_rate_num: u32,

  // Audio
  pub channels: u16,
  pub sample_rate: u32,
  pub bits_per_sample: u16,
  pub block_align: u16,
}

impl CodecParameters {
  pub fn video(codec_id: CodecId, width: u32, height: u32, frame_rate_num: u32) -> Self {
    Self {
      codec_type: CodecType::Video,
      codec_id,
      codec_tag: 0,
      bit_rate: 0,
      width,
      height,
      frame_rate_num,
      channels: 0,
      sample_rate: 0,
      bits_per_sample: 0,
      block_align: 0,
    }
  }

  pub fn audio(codec_id: CodecId, channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
    Self {
      codec_type: CodecType::Audio,
      codec_id,
      codec_tag: 0,
      bit_rate: 0,
      width: 0,
      height: 0,
      frame_rate_num: 0,
      channels,
      sample_rate,
      bits_per_sample,
      block_align: 0,
    }
  }

  /// Frame rate as an exact [`Rational`], `frame_rate_num / FRAME_RATE_BASE`.
  pub fn frame_rate(&self) -> Rational {
    Rational::new(self.frame_rate_num as i64, FRAME_RATE_BASE as i64)
  }
}

/// A single elementary stream within a [`crate::format::FormatContext`].
///
/// `index` is this crate's own dense stream index (`0..nb_streams`),
/// assigned at `add_stream` time; `id` is the format-specific identifier
/// some containers carry separately (ASF stream numbers, AVI's two-letter
/// tag ordinal) and may differ from `index`.
#[derive(Debug, Clone)]
pub struct Stream {
  pub index: usize,
  pub id: u32,
  pub time_base: Rational,
  pub duration_ms: i64,
  pub parameters: CodecParameters,
  /// Whether every packet emitted so far has been a key frame; demuxers
  /// use this to decide whether an index entry or seek point is needed.
  pub all_key_frames: bool,
  private: Option<StreamPrivate>,
}

/// Opaque per-demuxer bookkeeping a format module attaches to a stream it
/// owns, retrieved with [`Stream::private`] / [`Stream::private_mut`].
/// Kept as an enum rather than `Box<dyn Any>` since the format modules in
/// this crate are a closed set known at compile time.
#[derive(Debug, Clone)]
pub enum StreamPrivate {
  Avi(crate::format::avi::AviStreamState),
  Asf(crate::format::asf::AsfStreamState),
  Mov(crate::format::mov::MovStreamState),
}

impl Stream {
  pub fn new(index: usize, time_base: Rational, parameters: CodecParameters) -> Self {
    Self {
      index,
      id: index as u32,
      time_base,
      duration_ms: 0,
      parameters,
      all_key_frames: true,
      private: None,
    }
  }

  pub fn set_private(&mut self, private: StreamPrivate) {
    self.private = Some(private);
  }

  pub fn private(&self) -> Option<&StreamPrivate> {
    self.private.as_ref()
  }

  pub fn private_mut(&mut self) -> Option<&mut StreamPrivate> {
    self.private.as_mut()
  }

  /// Observe a packet's key-frame flag, clearing `all_key_frames` the
  /// first time a non-key packet is seen.
  pub fn observe_key_flag(&mut self, is_key: bool) {
    if !is_key {
      self.all_key_frames = false;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn video_params_carry_exact_frame_rate() {
    let params = CodecParameters::video(CodecId::Mjpeg, 320, 240, 25 * FRAME_RATE_BASE);
    assert_eq!(params.frame_rate(), Rational::new(25, 1));
  }

  #[test]
  fn new_stream_assumes_all_key_frames_until_told_otherwise() {
    let params = CodecParameters::audio(CodecId::PcmS16Le, 2, 44100, 16);
    let mut stream = Stream::new(0, Rational::new(1, 44100), params);
    assert!(stream.all_key_frames);
    stream.observe_key_flag(false);
    assert!(!stream.all_key_frames);
  }

  #[test]
  fn id_defaults_to_index() {
    let params = CodecParameters::audio(CodecId::PcmS16Le, 1, 8000, 8);
    let stream = Stream::new(3, Rational::new(1, 8000), params);
    assert_eq!(stream.id, 3);
  }
}
