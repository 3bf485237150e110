//! Animated GIF muxer: fixed 6×6×6 web-safe palette, one Graphic Control
//! Extension + Image Descriptor per frame, LZW-less output where every
//! pixel is its own 9-bit code bracketed by clear/end-of-stream codes.

use crate::bitio::ReverseBitWriter;
use crate::error::Result;
use crate::packet::Packet;

use super::registry::OutputFormatDescriptor;
use super::{FormatContext, Muxer};

const PALETTE_SIZE: usize = 216; // 6*6*6 web-safe cube
const CLEAR_CODE: u32 = 256;
const END_CODE: u32 = 257;
const CODE_BITS: u32 = 9;

fn web_safe_palette() -> [[u8; 3]; PALETTE_SIZE] {
  let mut palette = [[0u8; 3]; PALETTE_SIZE];
  let levels = [0x00, 0x33, 0x66, 0x99, 0xcc, 0xff];
  let mut i = 0;
  for &r in &levels {
    for &g in &levels {
      for &b in &levels {
        palette[i] = [r, g, b];
        i += 1;
      }
    }
  }
  palette
}

pub struct GifMuxer {
  width: u32,
  height: u32,
  frame_delay_jiffies: u16,
  wrote_header: bool,
}

impl Default for GifMuxer {
  fn default() -> Self {
    Self {
      width: 0,
      height: 0,
      frame_delay_jiffies: 4,
      wrote_header: false,
    }
  }
}

impl Muxer for GifMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let stream = ctx
      .streams
      .iter()
      .find(|s| s.parameters.codec_type == crate::codectags::CodecType::Video)
      .ok_or_else(|| crate::error::Error::InvalidData("gif output needs a video stream".into()))?;
    self.width = stream.parameters.width;
    self.height = stream.parameters.height;
    self.frame_delay_jiffies = frame_delay_in_jiffies(stream.parameters.frame_rate_num);

    let io = &mut ctx.io;
    io.put_buffer(b"GIF89a")?;
    io.put_le16(self.width as u16)?;
    io.put_le16(self.height as u16)?;
    // Global Color Table present, color resolution 7 (8 bits), not
    // sorted, table size field 7 -> 256 entries (256-entry table,
    // 216 of which hold the web-safe palette, the rest left black).
    io.put_byte(0b1111_0111)?;
    io.put_byte(0)?; // background color index
    io.put_byte(0)?; // pixel aspect ratio
    for color in web_safe_palette() {
      io.put_buffer(&color)?;
    }
    for _ in PALETTE_SIZE..256 {
      io.put_buffer(&[0, 0, 0])?;
    }
    // Netscape application extension: loop forever.
    io.put_buffer(b"\x21\xff\x0bNETSCAPE2.0\x03\x01\x00\x00\x00")?;
    self.wrote_header = true;
    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    let io = &mut ctx.io;
    // Graphic Control Extension.
    io.put_byte(0x21)?;
    io.put_byte(0xf9)?;
    io.put_byte(4)?; // block size
    io.put_byte(0x00)?; // no transparency, no disposal preference
    io.put_le16(self.frame_delay_jiffies)?;
    io.put_byte(0)?; // transparent color index (unused)
    io.put_byte(0)?; // block terminator

    // Image Descriptor.
    io.put_byte(0x2c)?;
    io.put_le16(0)?; // left
    io.put_le16(0)?; // top
    io.put_le16(self.width as u16)?;
    io.put_le16(self.height as u16)?;
    io.put_byte(0x00)?; // no local color table, not interlaced

    io.put_byte(CODE_BITS as u8 - 1)?; // LZW minimum code size, 8
    for sub_block in encode_frame(packet.data()) {
      io.put_byte(sub_block.len() as u8)?;
      io.put_buffer(&sub_block)?;
    }
    io.put_byte(0)?; // block terminator
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    ctx.io.put_byte(0x3b)?; // GIF trailer
    ctx.io.put_flush_packet()
  }
}

fn frame_delay_in_jiffies(frame_rate_num: u32) -> u16 {
  use crate::rational::{Rational, FRAME_RATE_BASE};
  if frame_rate_num == 0 {
    return 4;
  }
  // GIF delay time is in 1/100s units ("jiffies" here, loosely).
  Rational::new(frame_rate_num as i64, FRAME_RATE_BASE as i64)
    .rescale(1, Rational::new(1, 100))
    .max(1) as u16
}

/// Encode one frame's pixel indices as GIF sub-blocks (each ≤255 bytes),
/// giving every pixel its own fixed 9-bit code with no dictionary
/// growth: `CLEAR`, then one code per byte of `pixels`, then `END`.
fn encode_frame(pixels: &[u8]) -> Vec<Vec<u8>> {
  let mut writer = ReverseBitWriter::new();
  writer.put_bits(CLEAR_CODE, CODE_BITS);
  for &pixel in pixels {
    writer.put_bits(pixel as u32, CODE_BITS);
  }
  writer.put_bits(END_CODE, CODE_BITS);
  let bytes = writer.flush();
  bytes.chunks(255).map(|c| c.to_vec()).collect()
}

pub fn register(_inputs: &mut Vec<super::registry::InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  outputs.push(OutputFormatDescriptor {
    name: "gif",
    mime_type: "image/gif",
    extensions: "gif",
    needs_number: false,
    make: || Box::new(GifMuxer::default()),
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codectags::CodecId;
  use crate::ioctx::ByteIoContext;
  use crate::rational::{Rational, FRAME_RATE_BASE};
  use crate::stream::{CodecParameters, Stream};

  fn make_context() -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: String::new(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn header_starts_with_gif89a_and_256_entry_palette() {
    let mut ctx = make_context();
    let params = CodecParameters::video(CodecId::Gif, 4, 4, 10 * FRAME_RATE_BASE);
    ctx.add_stream(Stream::new(0, Rational::new(1, 10), params)).unwrap();

    let mut muxer = GifMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    assert_eq!(&bytes[0..6], b"GIF89a");
    // header(6) + dims(4) + flags/bg/aspect(3) + 256*3 palette = 781
    assert_eq!(bytes.len() >= 6 + 4 + 3 + 256 * 3, true);
    assert_eq!(*bytes.last().unwrap(), 0x3b);
  }

  #[test]
  fn every_pixel_gets_its_own_nine_bit_code() {
    let blocks = encode_frame(&[0, 1, 2, 3]);
    let flat: Vec<u8> = blocks.into_iter().flatten().collect();
    // CLEAR(9) + 4 pixels(9 each) + END(9) = 54 bits = 7 bytes (padded).
    assert_eq!(flat.len(), 7);
  }
}
