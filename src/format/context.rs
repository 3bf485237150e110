//! [`FormatContext`]: the top-level object holding either an input or an
//! output format, its buffered byte-stream, and its streams.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ioctx::ByteIoContext;
use crate::packet::Packet;
use crate::protocol::{self, flags};
use crate::stream::Stream;

use super::registry::{self, guess_output_format_scored, InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, Muxer};

/// Hard cap on streams per context, preserved at the API edge even
/// though streams are stored in a growable `Vec` internally.
pub const MAX_STREAMS: usize = 20;

/// Textual metadata, each field capped at 512 bytes on the API edge.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
  pub title: String,
  pub author: String,
  pub copyright: String,
  pub comment: String,
}

const METADATA_FIELD_CAP: usize = 512;

impl Metadata {
  fn clamp(value: String) -> String {
    if value.len() > METADATA_FIELD_CAP {
      value[..METADATA_FIELD_CAP].to_string()
    } else {
      value
    }
  }

  pub fn set_title(&mut self, value: impl Into<String>) {
    self.title = Self::clamp(value.into());
  }
  pub fn set_author(&mut self, value: impl Into<String>) {
    self.author = Self::clamp(value.into());
  }
  pub fn set_copyright(&mut self, value: impl Into<String>) {
    self.copyright = Self::clamp(value.into());
  }
  pub fn set_comment(&mut self, value: impl Into<String>) {
    self.comment = Self::clamp(value.into());
  }
}

/// Options controlling [`FormatContext::open_input`].
#[derive(Debug, Clone, Default)]
pub struct OpenInputOptions {
  /// Skip format guessing and force this short name.
  pub format_name: Option<String>,
  /// Upper bound on packets read during `find_stream_info`.
  pub probe_packet_limit: usize,
}

impl OpenInputOptions {
  pub fn new() -> Self {
    Self {
      format_name: None,
      probe_packet_limit: 64,
    }
  }
}

/// Options controlling [`FormatContext::open_output`].
#[derive(Debug, Clone, Default)]
pub struct OpenOutputOptions {
  pub format_name: Option<String>,
  pub mime_type: Option<String>,
}

/// Either side of an opened container: the buffered byte-stream, the
/// streams declared on it, metadata, and a read-ahead queue used by
/// `find_stream_info`.
pub struct FormatContext {
  pub io: ByteIoContext,
  pub filename: String,
  pub streams: Vec<Stream>,
  pub metadata: Metadata,
  /// Packets read ahead of the caller during info-probing, returned
  /// before any further underlying read.
  pub(crate) deferred_packets: std::collections::VecDeque<Packet>,
}

impl FormatContext {
  pub fn add_stream(&mut self, stream: Stream) -> Result<usize> {
    if self.streams.len() >= MAX_STREAMS {
      return Err(Error::TooManyStreams);
    }
    let index = self.streams.len();
    self.streams.push(stream);
    Ok(index)
  }

  pub fn stream(&self, index: usize) -> Result<&Stream> {
    self.streams.get(index).ok_or(Error::StreamNotFound(index))
  }

  pub fn stream_mut(&mut self, index: usize) -> Result<&mut Stream> {
    self.streams.get_mut(index).ok_or(Error::StreamNotFound(index))
  }
}

/// An opened input: the format context plus the demuxer driving it.
pub struct InputContext {
  pub ctx: FormatContext,
  demuxer: Box<dyn Demuxer>,
}

impl InputContext {
  /// Open `uri` for reading: opens the protocol, attaches the buffered
  /// byte-stream, resolves the format (by explicit name or by filename
  /// extension), and runs `read_header`.
  pub fn open_input(uri: &str, options: OpenInputOptions) -> Result<Self> {
    registry::init_registry();

    let (descriptor, score) = resolve_input_format(uri, &options)?;
    debug!(uri, format = descriptor.name, score, "resolved input format");

    let url = protocol::open(uri, flags::RDONLY)?;
    let io = ByteIoContext::fdopen(url, false);
    let mut ctx = FormatContext {
      io,
      filename: uri.to_string(),
      streams: Vec::new(),
      metadata: Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };

    let mut demuxer = (descriptor.make)();
    match demuxer.read_header(&mut ctx) {
      Ok(()) => Ok(Self { ctx, demuxer }),
      Err(e) => {
        warn!(uri, error = %e, "read_header failed, closing input");
        let _ = demuxer.read_close(&mut ctx);
        Err(e)
      }
    }
  }

  pub fn read_packet(&mut self) -> Result<Packet> {
    if let Some(packet) = self.ctx.deferred_packets.pop_front() {
      return Ok(packet);
    }
    self.demuxer.read_packet(&mut self.ctx)
  }

  /// Read packets into the deferred queue until every stream has seen at
  /// least one key-frame packet, or `probe_packet_limit` is reached.
  pub fn find_stream_info(&mut self, limit: usize) -> Result<()> {
    let mut seen = vec![false; self.ctx.streams.len()];
    let mut read = 0;
    while read < limit && seen.iter().any(|s| !s) {
      match self.demuxer.read_packet(&mut self.ctx) {
        Ok(packet) => {
          if let Some(flag) = seen.get_mut(packet.stream_index()) {
            if packet.is_key() {
              *flag = true;
            }
          }
          self.ctx.deferred_packets.push_back(packet);
          read += 1;
        }
        Err(Error::Eof) => break,
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  pub fn read_seek(&mut self, stream_index: usize, timestamp: i64) -> Result<()> {
    self.demuxer.read_seek(&mut self.ctx, stream_index, timestamp)
  }

  pub fn close(mut self) -> Result<()> {
    self.demuxer.read_close(&mut self.ctx)
  }
}

/// An opened output: the format context plus the muxer driving it.
pub struct OutputContext {
  pub ctx: FormatContext,
  muxer: Box<dyn Muxer>,
  wrote_header: bool,
  wrote_trailer: bool,
}

impl OutputContext {
  /// Open `uri` for writing, resolving the format by short name,
  /// filename extension, or MIME type.
  pub fn open_output(uri: &str, options: OpenOutputOptions) -> Result<Self> {
    registry::init_registry();

    let (descriptor, score) = guess_output_format_scored(
      options.format_name.as_deref(),
      Some(uri),
      options.mime_type.as_deref(),
    )
    .ok_or_else(|| Error::UnsupportedFormat(uri.to_string()))?;
    debug!(uri, format = descriptor.name, score, "resolved output format");

    let url = protocol::open(uri, flags::WRONLY)?;
    let io = ByteIoContext::fdopen(url, true);
    let ctx = FormatContext {
      io,
      filename: uri.to_string(),
      streams: Vec::new(),
      metadata: Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };

    Ok(Self {
      ctx,
      muxer: (descriptor.make)(),
      wrote_header: false,
      wrote_trailer: false,
    })
  }

  pub fn write_header(&mut self) -> Result<()> {
    self.muxer.write_header(&mut self.ctx)?;
    self.wrote_header = true;
    Ok(())
  }

  pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
    if !self.wrote_header {
      self.write_header()?;
    }
    if let Ok(stream) = self.ctx.stream_mut(packet.stream_index()) {
      stream.observe_key_flag(packet.is_key());
    }
    self.muxer.write_packet(&mut self.ctx, packet)
  }

  pub fn write_trailer(&mut self) -> Result<()> {
    if self.wrote_trailer {
      return Ok(());
    }
    debug!(filename = %self.ctx.filename, "writing trailer");
    self.muxer.write_trailer(&mut self.ctx)?;
    self.wrote_trailer = true;
    Ok(())
  }
}

/// Resolve the input format, plus the score behind the choice: a forced
/// `short_name` counts as an exact (100) match, an extension match as a
/// weak (5) one, mirroring [`registry::guess_output_format_scored`]'s
/// weights.
fn resolve_input_format<'a>(
  uri: &str,
  options: &OpenInputOptions,
) -> Result<(&'static InputFormatDescriptor, i32)> {
  if let Some(name) = &options.format_name {
    return registry::input_formats()
      .iter()
      .find(|fmt| fmt.name.eq_ignore_ascii_case(name))
      .map(|fmt| (fmt, 100))
      .ok_or_else(|| Error::UnsupportedFormat(name.clone()));
  }
  registry::guess_input_format_by_extension(uri)
    .map(|fmt| (fmt, 5))
    .ok_or_else(|| Error::UnsupportedFormat(uri.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn metadata_clamps_oversize_fields() {
    let mut metadata = Metadata::default();
    metadata.set_title("x".repeat(600));
    assert_eq!(metadata.title.len(), METADATA_FIELD_CAP);
  }

  #[test]
  fn add_stream_enforces_max_streams() {
    use crate::codectags::CodecId;
    use crate::rational::Rational;
    use crate::stream::CodecParameters;

    let mut ctx = FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: String::new(),
      streams: Vec::new(),
      metadata: Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };
    for i in 0..MAX_STREAMS {
      let params = CodecParameters::audio(CodecId::PcmS16Le, 1, 8000, 8);
      ctx.add_stream(Stream::new(i, Rational::new(1, 8000), params)).unwrap();
    }
    let params = CodecParameters::audio(CodecId::PcmS16Le, 1, 8000, 8);
    let result = ctx.add_stream(Stream::new(MAX_STREAMS, Rational::new(1, 8000), params));
    assert!(matches!(result, Err(Error::TooManyStreams)));
  }
}
