//! Motion-JPEG variants: `singlejpeg` (one frame, one file), `mpjpeg`
//! (MIME multipart boundaries strung together in one stream) and `jpeg`
//! (one file per frame via an image-sequence-style filename template).

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream};

use super::image::expand_template;
use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

const MPJPEG_BOUNDARY: &str = "ffmpegboundary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjpegVariant {
  Single,
  Multipart,
  Sequence,
}

pub struct MjpegMuxer {
  variant: MjpegVariant,
  frame_index: u64,
}

impl MjpegMuxer {
  fn new(variant: MjpegVariant) -> Self {
    Self { variant, frame_index: 0 }
  }
}

impl Muxer for MjpegMuxer {
  fn write_header(&mut self, _ctx: &mut FormatContext) -> Result<()> {
    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    match self.variant {
      MjpegVariant::Single | MjpegVariant::Sequence => {
        ctx.io.put_buffer(packet.data())?;
      }
      MjpegVariant::Multipart => {
        let part_header = format!(
          "--{MPJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
          packet.size()
        );
        ctx.io.put_buffer(part_header.as_bytes())?;
        ctx.io.put_buffer(packet.data())?;
        ctx.io.put_buffer(b"\r\n")?;
      }
    }
    self.frame_index += 1;
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    if self.variant == MjpegVariant::Multipart {
      ctx.io.put_buffer(format!("--{MPJPEG_BOUNDARY}--\r\n").as_bytes())?;
    }
    ctx.io.put_flush_packet()
  }
}

/// Reads an entire single-frame JPEG file (`singlejpeg`/`jpeg`): the
/// whole byte stream is one packet.
#[derive(Default)]
pub struct MjpegDemuxer;

impl Demuxer for MjpegDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 2 && probe_data[0] == 0xff && probe_data[1] == 0xd8 {
      100
    } else {
      0
    }
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let params = CodecParameters::video(crate::codectags::CodecId::Mjpeg, 0, 0, 25 * FRAME_RATE_BASE);
    ctx.add_stream(Stream::new(0, Rational::new(1, 25), params))?;
    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
      let n = ctx.io.get_buffer(&mut chunk)?;
      if n == 0 {
        break;
      }
      buf.extend_from_slice(&chunk[..n]);
    }
    if buf.is_empty() {
      return Err(Error::Eof);
    }
    let mut packet = Packet::from_bytes(buf);
    packet.set_key(true);
    Ok(packet)
  }
}

/// Build the filename for frame `index` of a `jpeg` image-sequence
/// output, given its template (e.g. `"frame%03d.jpg"`).
pub fn sequence_filename(template: &str, index: u64) -> Result<String> {
  expand_template(template, index)
}

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "jpeg",
    mime_type: "image/jpeg",
    extensions: "jpg,jpeg",
    make: || Box::new(MjpegDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "singlejpeg",
    mime_type: "image/jpeg",
    extensions: "jpg,jpeg",
    needs_number: false,
    make: || Box::new(MjpegMuxer::new(MjpegVariant::Single)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "mpjpeg",
    mime_type: "multipart/x-mixed-replace",
    extensions: "mjpg",
    needs_number: false,
    make: || Box::new(MjpegMuxer::new(MjpegVariant::Multipart)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "jpeg",
    mime_type: "image/jpeg",
    extensions: "jpg,jpeg",
    needs_number: true,
    make: || Box::new(MjpegMuxer::new(MjpegVariant::Sequence)),
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ioctx::ByteIoContext;

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
  fn multipart_frames_are_boundary_delimited() {
    let mut ctx = make_context();
    let mut muxer = MjpegMuxer::new(MjpegVariant::Multipart);
    muxer.write_header(&mut ctx).unwrap();
    muxer.write_packet(&mut ctx, &Packet::from_bytes(vec![0xff, 0xd8, 0xff, 0xd9])).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.starts_with("--ffmpegboundary\r\n"));
    assert!(text.contains("Content-Length: 4\r\n"));
    assert!(text.ends_with("--ffmpegboundary--\r\n"));
  }

  #[test]
  fn sequence_filename_matches_image_template_rules() {
    assert_eq!(sequence_filename("frame%03d.jpg", 7).unwrap(), "frame007.jpg");
  }
}
