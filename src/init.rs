//! Process-wide initialization.

use crate::format::registry;

/// Build and install the process-wide format registry. Idempotent: safe
/// to call more than once, and implicitly called by
/// [`crate::format::InputContext::open_input`] /
/// [`crate::format::OutputContext::open_output`] if not already done.
pub fn init() {
  registry::init_registry();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn init_is_idempotent() {
    init();
    init();
    assert!(!crate::format::registry::input_formats().is_empty());
  }
}
