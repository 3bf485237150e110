//! Trivial pass-through container for raw elementary streams (PCM, AC3,
//! H.263, MJPEG, MPEG-1 video, MP2): no header, no framing, packets are
//! written and read back byte-for-byte.

use crate::codectags::CodecId;
use crate::error::Result;
use crate::packet::Packet;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

/// Packet size the demuxer reads raw streams in, chosen to be a
/// convenient multiple for PCM sample alignment.
const READ_CHUNK: usize = 1024;

macro_rules! raw_format {
  ($input_name:ident, $output_name:ident, $short_name:expr, $ext:expr, $codec_id:expr) => {
    pub struct $input_name {
      codec_id: CodecId,
    }

    impl Default for $input_name {
      fn default() -> Self {
        Self { codec_id: $codec_id }
      }
    }

    impl Demuxer for $input_name {
      fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
        let params = match self.codec_id.codec_type() {
          crate::codectags::CodecType::Video => {
            CodecParameters::video(self.codec_id, 0, 0, 25 * FRAME_RATE_BASE)
          }
          _ => CodecParameters::audio(self.codec_id, 1, 8000, 8),
        };
        ctx.add_stream(Stream::new(0, Rational::new(1, 90_000), params))?;
        Ok(())
      }

      fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
        let mut buf = vec![0u8; READ_CHUNK];
        let read = ctx.io.get_buffer(&mut buf)?;
        if read == 0 {
          return Err(crate::error::Error::Eof);
        }
        buf.truncate(read);
        let mut packet = Packet::from_bytes(buf);
        packet.set_key(true);
        Ok(packet)
      }
    }

    #[derive(Default)]
    pub struct $output_name;

    impl Muxer for $output_name {
      fn write_header(&mut self, _ctx: &mut FormatContext) -> Result<()> {
        Ok(())
      }

      fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
        ctx.io.put_buffer(packet.data())
      }

      fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
        ctx.io.put_flush_packet()
      }
    }
  };
}

raw_format!(PcmS16LeDemuxer, PcmS16LeMuxer, "s16le", "sw", CodecId::PcmS16Le);
raw_format!(Ac3Demuxer, Ac3Muxer, "ac3", "ac3", CodecId::Ac3);
raw_format!(H263Demuxer, H263Muxer, "h263", "h263", CodecId::H263);
raw_format!(Mpeg1VideoDemuxer, Mpeg1VideoMuxer, "mpeg1video", "mpg,mpeg,m1v", CodecId::Mpeg1Video);
raw_format!(Mp2Demuxer, Mp2Muxer, "mp2", "mp2,m2a", CodecId::Mp2);

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "s16le",
    mime_type: "audio/x-pcm",
    extensions: "sw",
    make: || Box::new(PcmS16LeDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "s16le",
    mime_type: "audio/x-pcm",
    extensions: "sw",
    needs_number: false,
    make: || Box::new(PcmS16LeMuxer::default()),
  });

  inputs.push(InputFormatDescriptor {
    name: "ac3",
    mime_type: "audio/ac3",
    extensions: "ac3",
    make: || Box::new(Ac3Demuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "ac3",
    mime_type: "audio/ac3",
    extensions: "ac3",
    needs_number: false,
    make: || Box::new(Ac3Muxer::default()),
  });

  inputs.push(InputFormatDescriptor {
    name: "h263",
    mime_type: "video/h263",
    extensions: "h263",
    make: || Box::new(H263Demuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "h263",
    mime_type: "video/h263",
    extensions: "h263",
    needs_number: false,
    make: || Box::new(H263Muxer::default()),
  });

  inputs.push(InputFormatDescriptor {
    name: "mpeg1video",
    mime_type: "video/mpeg",
    extensions: "mpg,mpeg,m1v",
    make: || Box::new(Mpeg1VideoDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "mpeg1video",
    mime_type: "video/mpeg",
    extensions: "m1v",
    needs_number: false,
    make: || Box::new(Mpeg1VideoMuxer::default()),
  });

  inputs.push(InputFormatDescriptor {
    name: "mp2",
    mime_type: "audio/mpeg",
    extensions: "mp2,m2a",
    make: || Box::new(Mp2Demuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "mp2",
    mime_type: "audio/mpeg",
    extensions: "mp2",
    needs_number: false,
    make: || Box::new(Mp2Muxer::default()),
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ioctx::ByteIoContext;

  fn make_context(write_mode: bool) -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), write_mode),
      filename: String::new(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn mux_writes_packets_back_to_back_with_no_framing() {
    let mut ctx = make_context(true);
    let mut muxer = PcmS16LeMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    muxer.write_packet(&mut ctx, &Packet::from_bytes(vec![1, 2, 3, 4])).unwrap();
    muxer.write_packet(&mut ctx, &Packet::from_bytes(vec![5, 6])).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();
    assert_eq!(ctx.io.into_inner_buf(), vec![1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn demux_allocates_single_stream_and_reads_fixed_chunks() {
    let data = vec![0xAAu8; READ_CHUNK * 2 + 10];
    let mut ctx = FormatContext {
      io: ByteIoContext::open_buf(data, false),
      filename: String::new(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };
    let mut demuxer = Ac3Demuxer::default();
    demuxer.read_header(&mut ctx).unwrap();
    assert_eq!(ctx.streams.len(), 1);
    assert_eq!(ctx.streams[0].parameters.codec_id, CodecId::Ac3);

    let first = demuxer.read_packet(&mut ctx).unwrap();
    assert_eq!(first.size(), READ_CHUNK);
    let second = demuxer.read_packet(&mut ctx).unwrap();
    assert_eq!(second.size(), READ_CHUNK);
    let third = demuxer.read_packet(&mut ctx).unwrap();
    assert_eq!(third.size(), 10);
    assert!(demuxer.read_packet(&mut ctx).is_err());
  }
}
