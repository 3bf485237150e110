use std::error;
use std::fmt;
use std::io;

/// Represents container I/O errors.
///
/// Mirrors the taxonomy a muxer/demuxer actually needs to distinguish:
/// I/O failures from the underlying protocol, malformed on-disk data,
/// unsupported formats/tags, and programmer errors (bad whence, unknown
/// stream, seeking a streamed source).
#[derive(Debug)]
pub enum Error {
  /// The underlying protocol reported an error, or a short read/write
  /// occurred where a precise length was required.
  Io(io::Error),
  /// GUID/fourcc/magic mismatch, chunk size out of bounds, or truncated
  /// mid-record.
  InvalidData(String),
  /// No registered (de)muxer matched the requested short name, filename
  /// or probe data.
  UnsupportedFormat(String),
  /// A codec tag table lookup found no entry for the given id or tag.
  UnknownCodecTag,
  /// A packet or stream operation referenced a stream index that does
  /// not exist in this format context.
  StreamNotFound(usize),
  /// Adding a stream would exceed `MAX_STREAMS`.
  TooManyStreams,
  /// `fseek` was called with a whence other than `Set`/`Cur`.
  InvalidWhence,
  /// A seek was attempted on a non-seekable (streamed) source.
  NotSeekable,
  /// A caller-supplied buffer was too small for the requested read.
  BufferTooSmall,
  /// End of stream was reached where more data was required.
  Eof,
}

impl error::Error for Error {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      Error::Io(ref internal) => Some(internal),
      _ => None,
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::Io(ref internal) => internal.fmt(f),
      Error::InvalidData(ref msg) => write!(f, "invalid container data: {msg}"),
      Error::UnsupportedFormat(ref msg) => write!(f, "unsupported format: {msg}"),
      Error::UnknownCodecTag => write!(f, "unknown codec tag"),
      Error::StreamNotFound(index) => write!(f, "stream {index} not found"),
      Error::TooManyStreams => write!(f, "too many streams (MAX_STREAMS exceeded)"),
      Error::InvalidWhence => write!(f, "invalid seek whence"),
      Error::NotSeekable => write!(f, "source is not seekable"),
      Error::BufferTooSmall => write!(f, "buffer too small"),
      Error::Eof => write!(f, "end of stream"),
    }
  }
}

impl From<io::Error> for Error {
  fn from(internal: io::Error) -> Error {
    Error::Io(internal)
  }
}

impl Error {
  /// Legacy negated-errno-style numeric code, for callers that key off
  /// the `AVERROR_*` taxonomy from the on-disk/on-wire spec rather than
  /// matching the enum.
  pub fn code(&self) -> i32 {
    match self {
      Error::Io(e) => match e.kind() {
        io::ErrorKind::NotFound => -2,       // ENOENT
        io::ErrorKind::BrokenPipe => -32,    // EPIPE
        io::ErrorKind::WouldBlock => -11,    // EAGAIN
        io::ErrorKind::Interrupted => -4,    // EINTR
        _ => -5,                             // EIO
      },
      Error::InvalidData(_) => -4,           // AVERROR_INVALIDDATA
      Error::UnsupportedFormat(_) | Error::UnknownCodecTag => -6, // AVERROR_NOFMT
      Error::StreamNotFound(_) => -3,        // AVERROR_NUMEXPECTED
      Error::TooManyStreams | Error::BufferTooSmall => -12, // ENOMEM
      Error::InvalidWhence | Error::NotSeekable => -22, // EINVAL
      Error::Eof => -61,                     // ENODATA
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
