//! Timestamp arithmetic against an explicit rational time base.
//!
//! [`Time`] backs the PTS/duration math used by the MPEG-PS packetizer's
//! `Ticker` and the ASF per-frame PTS derivation. A [`Time`] may carry no
//! value at all (a packet whose PTS is unknown), in which case arithmetic
//! on it propagates `None` rather than panicking.

use std::time::Duration;

use crate::rational::Rational;

/// Represents a time or duration expressed in an explicit [`Rational`]
/// time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
  time: Option<i64>,
  time_base: Rational,
}

impl Time {
  /// Create a new time by its value and the time base it is expressed in.
  pub fn new(time: Option<i64>, time_base: Rational) -> Time {
    Self { time, time_base }
  }

  /// Re-express this timestamp in a different time base.
  pub fn with_time_base(&self, time_base: Rational) -> Self {
    Time {
      time: self.time.map(|t| self.time_base.rescale(t, time_base)),
      time_base,
    }
  }

  /// A timestamp representing `1 / nth` of a second.
  pub fn from_nth_of_a_second(nth: i64) -> Self {
    Self {
      time: Some(1),
      time_base: Rational::new(1, nth),
    }
  }

  /// A timestamp from a floating-point number of seconds, expressed in
  /// the 90kHz time base conventional for MPEG PTS fields.
  pub fn from_secs(secs: f64) -> Self {
    const DEN: i64 = 90_000;
    Self {
      time: Some((secs * DEN as f64).round() as i64),
      time_base: Rational::new(1, DEN),
    }
  }

  /// A timestamp of `time` units where each unit is `1 / base_den` seconds.
  pub fn from_units(time: i64, base_den: i64) -> Self {
    Self {
      time: Some(time),
      time_base: Rational::new(1, base_den),
    }
  }

  /// A zero-valued timestamp in the 90kHz time base.
  pub fn zero() -> Self {
    Time {
      time: Some(0),
      time_base: Rational::new(1, 90_000),
    }
  }

  pub fn has_value(&self) -> bool {
    self.time.is_some()
  }

  /// Align `rhs` to `self`'s time base, producing an [`Aligned`] pair on
  /// which arithmetic can be performed.
  pub fn aligned_with(&self, rhs: &Time) -> Aligned {
    Aligned {
      lhs: self.time,
      rhs: rhs.time.map(|v| rhs.time_base.rescale(v, self.time_base)),
      time_base: self.time_base,
    }
  }

  pub fn as_secs_f64(&self) -> f64 {
    match self.time {
      Some(t) => t as f64 * self.time_base.as_f64(),
      None => 0.0,
    }
  }

  pub fn into_parts(self) -> (Option<i64>, Rational) {
    (self.time, self.time_base)
  }

  pub fn into_value(self) -> Option<i64> {
    self.time
  }
}

impl From<Time> for Duration {
  fn from(timestamp: Time) -> Self {
    Duration::from_secs_f64(timestamp.as_secs_f64().max(0.0))
  }
}

impl std::fmt::Display for Time {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self.time {
      Some(time) => write!(f, "{time}/{}", self.time_base),
      None => write!(f, "none"),
    }
  }
}

/// Two timestamps rescaled to a common time base, ready for arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aligned {
  lhs: Option<i64>,
  rhs: Option<i64>,
  time_base: Rational,
}

impl Aligned {
  pub fn add(self) -> Time {
    self.apply(|lhs, rhs| lhs + rhs)
  }

  pub fn subtract(self) -> Time {
    self.apply(|lhs, rhs| lhs - rhs)
  }

  fn apply<F>(self, f: F) -> Time
  where
    F: FnOnce(i64, i64) -> i64,
  {
    match (self.lhs, self.rhs) {
      (Some(lhs), Some(rhs)) => Time {
        time: Some(f(lhs, rhs)),
        time_base: self.time_base,
      },
      _ => Time {
        time: None,
        time_base: self.time_base,
      },
    }
  }
}

/// Advances PTS by one frame time per submission, used by the MPEG-PS
/// per-stream packetizer to derive exact rational PTS deltas from an
/// `(inrate, outrate)` pair (e.g. `(sample_rate, 90000 * frame_size)` for
/// audio, `(frame_rate, 90000 * FRAME_RATE_BASE)` for video).
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
  count: i64,
  inrate: i64,
  outrate: i64,
}

impl Ticker {
  pub fn new(inrate: i64, outrate: i64) -> Self {
    Self {
      count: 0,
      inrate,
      outrate,
    }
  }

  /// Current accumulated PTS, in `outrate` units, as of the last `tick`.
  pub fn pts(&self) -> i64 {
    Rational::new(1, self.inrate).rescale(self.count, Rational::new(1, self.outrate))
  }

  /// Advance by one input unit (e.g. one frame, or `frame_size` samples
  /// folded into the caller's `inrate`) and return the new PTS.
  pub fn tick(&mut self) -> i64 {
    self.count += 1;
    self.pts()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn has_value() {
    let time = Time::new(Some(2), Rational::new(3, 9));
    assert!(time.has_value());
    assert_eq!(time.into_value(), Some(2));
  }

  #[test]
  fn with_time_base_preserves_seconds() {
    let time = Time::new(Some(2), Rational::new(3, 9));
    let rebased = time.with_time_base(Rational::new(1, 9));
    assert_eq!(rebased.into_value(), Some(6));
  }

  #[test]
  fn add_and_subtract() {
    let a = Time::from_secs(0.2);
    let b = Time::from_secs(0.3);
    assert_eq!(a.aligned_with(&b).add(), Time::from_secs(0.5));
    let c = Time::from_secs(0.8);
    let d = Time::from_secs(0.4);
    assert_eq!(c.aligned_with(&d).subtract(), Time::from_secs(0.4));
  }

  #[test]
  fn none_propagates() {
    let a = Time::new(None, Rational::new(1, 1));
    let b = Time::from_secs(1.0);
    assert_eq!(a.aligned_with(&b).add(), Time::new(None, Rational::new(1, 1)));
  }

  #[test]
  fn ticker_video_25fps_matches_frame_rate_base() {
    use crate::rational::FRAME_RATE_BASE;
    let mut ticker = Ticker::new(25, 90_000 * FRAME_RATE_BASE as i64);
    let first = ticker.tick();
    // One frame at 25fps = 3600 ticks at 90kHz.
    assert_eq!(first, 3600);
    let second = ticker.tick();
    assert_eq!(second, 7200);
  }
}
