mod bitio;
mod codectags;
mod error;
pub mod format;
mod guid;
mod init;
mod ioctx;
mod packet;
pub mod protocol;
mod rational;
mod stream;
mod time;

pub use bitio::{BitWriter, JpegBitWriter, ReverseBitWriter};
pub use codectags::{CodecId, CodecTag, CodecType};
pub use error::{Error, Result};
pub use format::context::{
  InputContext, Metadata, OpenInputOptions, OpenOutputOptions, OutputContext, MAX_STREAMS,
};
pub use format::{Demuxer, FormatContext, Muxer};
pub use guid::Guid;
pub use init::init;
pub use ioctx::ByteIoContext;
pub use packet::{flags as packet_flags, Packet};
pub use rational::{Rational, FRAME_RATE_BASE};
pub use stream::{CodecParameters, Stream, StreamPrivate};
pub use time::{Aligned, Ticker, Time};
