//! Per-container muxer/demuxer modules and the top-level [`context::FormatContext`]
//! that drives them.

pub mod asf;
pub mod au;
pub mod avi;
pub mod context;
pub mod crc;
pub mod gif;
pub mod image;
pub mod mjpeg;
pub mod mov;
pub mod mpegps;
pub mod ogg;
pub mod raw;
pub mod registry;
pub mod wav;

pub use context::{FormatContext, Metadata, MAX_STREAMS};

use crate::error::Result;
use crate::packet::Packet;

/// Implemented by every container module that can write packets into its
/// format. `None`-returning trait methods are modelled by simply not
/// calling them; there is no optional-method story needed since every
/// muxer in this crate implements the full triad.
pub trait Muxer: Send {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()>;
  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()>;
  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()>;
}

/// Implemented by every container module that can read packets out of
/// its format.
pub trait Demuxer: Send {
  /// Score how confidently `probe_data` looks like this format. Formats
  /// with no meaningful probe (matched by extension only) return 0.
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    let _ = probe_data;
    0
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()>;
  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet>;

  fn read_close(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let _ = ctx;
    Ok(())
  }

  /// Seek the given stream to the packet nearest `timestamp` (in the
  /// stream's time base). Formats that cannot seek leave the default,
  /// which reports [`crate::error::Error::NotSeekable`].
  fn read_seek(&mut self, ctx: &mut FormatContext, stream_index: usize, timestamp: i64) -> Result<()> {
    let _ = (ctx, stream_index, timestamp);
    Err(crate::error::Error::NotSeekable)
  }
}
