//! Process-wide input/output format registries and format guessing.

use std::sync::OnceLock;

use crate::format::{Demuxer, Muxer};

/// Static descriptor for a registered output format (muxer).
pub struct OutputFormatDescriptor {
  pub name: &'static str,
  pub mime_type: &'static str,
  pub extensions: &'static str,
  pub needs_number: bool,
  pub make: fn() -> Box<dyn Muxer>,
}

/// Static descriptor for a registered input format (demuxer).
pub struct InputFormatDescriptor {
  pub name: &'static str,
  pub mime_type: &'static str,
  pub extensions: &'static str,
  pub make: fn() -> Box<dyn Demuxer>,
}

struct Registry {
  inputs: Vec<InputFormatDescriptor>,
  outputs: Vec<OutputFormatDescriptor>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Register every container module this crate ships. Idempotent: later
/// calls observe the same, already-built registry. Must be called (or
/// [`crate::init::init`] called, which calls this) before any
/// `guess_format`/`open_input`/`open_output` use.
pub fn init_registry() {
  REGISTRY.get_or_init(build_registry);
}

fn build_registry() -> Registry {
  let mut inputs = Vec::new();
  let mut outputs = Vec::new();
  crate::format::wav::register(&mut inputs, &mut outputs);
  crate::format::au::register(&mut inputs, &mut outputs);
  crate::format::avi::register(&mut inputs, &mut outputs);
  crate::format::asf::register(&mut inputs, &mut outputs);
  crate::format::mov::register(&mut inputs, &mut outputs);
  crate::format::mpegps::register(&mut inputs, &mut outputs);
  crate::format::raw::register(&mut inputs, &mut outputs);
  crate::format::crc::register(&mut inputs, &mut outputs);
  crate::format::image::register(&mut inputs, &mut outputs);
  crate::format::gif::register(&mut inputs, &mut outputs);
  crate::format::mjpeg::register(&mut inputs, &mut outputs);
  crate::format::ogg::register(&mut inputs, &mut outputs);
  Registry { inputs, outputs }
}

fn registry() -> &'static Registry {
  REGISTRY.get_or_init(build_registry)
}

pub fn input_formats() -> &'static [InputFormatDescriptor] {
  &registry().inputs
}

pub fn output_formats() -> &'static [OutputFormatDescriptor] {
  &registry().outputs
}

fn extension_matches(extensions: &str, filename: &str) -> bool {
  let ext = match filename.rsplit_once('.') {
    Some((_, ext)) => ext.to_ascii_lowercase(),
    None => return false,
  };
  extensions
    .split(',')
    .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
}

/// Score and pick the best-matching registered output format.
///
/// Scoring: +100 exact short-name match, +10 exact MIME match, +5 a
/// matching filename extension. Ties break by registration order (the
/// first-seen highest score wins, since later candidates only replace
/// the current best on a strictly greater score).
pub fn guess_output_format(
  short_name: Option<&str>,
  filename: Option<&str>,
  mime_type: Option<&str>,
) -> Option<&'static OutputFormatDescriptor> {
  guess_output_format_scored(short_name, filename, mime_type).map(|(fmt, _)| fmt)
}

/// Same as [`guess_output_format`] but also returns the winning score, for
/// callers that want to log it.
pub fn guess_output_format_scored(
  short_name: Option<&str>,
  filename: Option<&str>,
  mime_type: Option<&str>,
) -> Option<(&'static OutputFormatDescriptor, i32)> {
  let mut best: Option<(&'static OutputFormatDescriptor, i32)> = None;
  for fmt in output_formats() {
    let mut score = 0;
    if let Some(short_name) = short_name {
      if fmt.name.eq_ignore_ascii_case(short_name) {
        score += 100;
      }
    }
    if let Some(mime_type) = mime_type {
      if fmt.mime_type.eq_ignore_ascii_case(mime_type) {
        score += 10;
      }
    }
    if let Some(filename) = filename {
      if extension_matches(fmt.extensions, filename) {
        score += 5;
      }
    }
    if score > 0 && best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
      best = Some((fmt, score));
    }
  }
  best
}

/// Guess an input format by filename extension only (no probe buffer
/// available at this call site; callers with file content should prefer
/// running each candidate's `read_probe` themselves).
pub fn guess_input_format_by_extension(filename: &str) -> Option<&'static InputFormatDescriptor> {
  input_formats()
    .iter()
    .find(|fmt| extension_matches(fmt.extensions, filename))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extension_match_is_case_insensitive_and_comma_separated() {
    assert!(extension_matches("wav", "clip.WAV"));
    assert!(extension_matches("jpg,jpeg", "photo.jpeg"));
    assert!(!extension_matches("wav", "clip.mp3"));
  }

  #[test]
  fn guess_output_format_prefers_short_name_over_extension() {
    init_registry();
    let fmt = guess_output_format(Some("wav"), Some("out.mp4"), None);
    assert!(fmt.is_some());
    assert_eq!(fmt.unwrap().name, "wav");
  }
}
