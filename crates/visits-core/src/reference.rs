//! Booking references: short, shareable tokens derived from a visit's
//! surrogate identity.
//!
//! The codec reads the identity as a number in base `alphabet.len()`, pads it
//! to at least `min_length` symbols (rounded up to a whole number of chunks),
//! and then scrambles the symbols with a running accumulator so neighbouring
//! identities do not produce neighbouring tokens. The scramble is a bijection
//! for a fixed token length, so tokens never collide.
//!
//! This is obfuscation, not encryption: anyone holding the configuration can
//! reverse a token.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Alphabet without the easily-confused `0`, `1`, `i`, `l` and `o`.
pub const DEFAULT_ALPHABET: &str = "23456789abcdefghjkmnpqrstuvwxyz";
pub const DEFAULT_MIN_LENGTH: usize = 8;
pub const DEFAULT_CHUNK_SIZE: usize = 2;
pub const DEFAULT_DELIMITER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
  #[error("invalid reference codec configuration: {0}")]
  InvalidConfiguration(String),

  #[error("invalid reference token: {0:?}")]
  InvalidToken(String),
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Serialisable codec settings, as read from the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
  pub alphabet:   String,
  pub min_length: usize,
  pub chunk_size: usize,
  pub delimiter:  String,
}

impl Default for ReferenceConfig {
  fn default() -> Self {
    Self {
      alphabet:   DEFAULT_ALPHABET.to_owned(),
      min_length: DEFAULT_MIN_LENGTH,
      chunk_size: DEFAULT_CHUNK_SIZE,
      delimiter:  DEFAULT_DELIMITER.to_owned(),
    }
  }
}

impl TryFrom<&ReferenceConfig> for ReferenceCodec {
  type Error = CodecError;

  fn try_from(cfg: &ReferenceConfig) -> Result<Self, Self::Error> {
    ReferenceCodec::new(&cfg.alphabet, cfg.min_length, cfg.chunk_size, &cfg.delimiter)
  }
}

// ─── Codec ───────────────────────────────────────────────────────────────────

/// Reversible mapping between `u64` identities and booking references.
///
/// Cheap to clone; holds only its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCodec {
  alphabet:   Vec<char>,
  min_length: usize,
  chunk_size: usize,
  delimiter:  Option<char>,
}

impl Default for ReferenceCodec {
  fn default() -> Self {
    Self {
      alphabet:   DEFAULT_ALPHABET.chars().collect(),
      min_length: DEFAULT_MIN_LENGTH,
      chunk_size: DEFAULT_CHUNK_SIZE,
      delimiter:  Some('-'),
    }
  }
}

impl ReferenceCodec {
  /// Build a codec, validating every parameter.
  ///
  /// `delimiter` may be empty (no grouping) or exactly one non-alphanumeric
  /// character that does not appear in `alphabet`.
  pub fn new(
    alphabet: &str,
    min_length: usize,
    chunk_size: usize,
    delimiter: &str,
  ) -> Result<Self, CodecError> {
    if min_length == 0 {
      return Err(CodecError::InvalidConfiguration(
        "minimum length must be greater than zero".into(),
      ));
    }
    if chunk_size == 0 {
      return Err(CodecError::InvalidConfiguration(
        "chunk size must be greater than zero".into(),
      ));
    }

    let mut chars = delimiter.chars();
    let delimiter = match (chars.next(), chars.next()) {
      (None, _) => None,
      (Some(c), None) if !c.is_alphanumeric() => Some(c),
      (Some(_), None) => {
        return Err(CodecError::InvalidConfiguration(format!(
          "delimiter {delimiter:?} must not be alphanumeric"
        )));
      }
      (Some(_), Some(_)) => {
        return Err(CodecError::InvalidConfiguration(format!(
          "delimiter {delimiter:?} must be a single character"
        )));
      }
    };

    let symbols: Vec<char> = alphabet.chars().collect();
    if symbols.len() < 2 {
      return Err(CodecError::InvalidConfiguration(
        "alphabet needs at least two symbols".into(),
      ));
    }
    for (i, c) in symbols.iter().enumerate() {
      if symbols[..i].contains(c) {
        return Err(CodecError::InvalidConfiguration(format!(
          "alphabet contains {c:?} more than once"
        )));
      }
      if Some(*c) == delimiter {
        return Err(CodecError::InvalidConfiguration(format!(
          "alphabet contains the delimiter {c:?}"
        )));
      }
    }

    Ok(Self { alphabet: symbols, min_length, chunk_size, delimiter })
  }

  fn base(&self) -> u64 { self.alphabet.len() as u64 }

  /// Number of symbols (excluding delimiters) used for a value with
  /// `natural` significant digits.
  fn padded_len(&self, natural: usize) -> usize {
    let len = natural.max(self.min_length);
    len.div_ceil(self.chunk_size) * self.chunk_size
  }

  /// Encode `id` as a booking reference.
  pub fn encode(&self, id: u64) -> String {
    let base = self.base();

    // Least significant digit first.
    let mut digits = Vec::new();
    let mut rest = id;
    loop {
      digits.push((rest % base) as usize);
      rest /= base;
      if rest == 0 {
        break;
      }
    }
    let len = self.padded_len(digits.len());
    digits.resize(len, 0);

    let symbols = self.scramble(&digits);

    let mut out = String::with_capacity(len + len / self.chunk_size);
    for (i, s) in symbols.iter().rev().enumerate() {
      if i > 0 && i % self.chunk_size == 0 {
        if let Some(d) = self.delimiter {
          out.push(d);
        }
      }
      out.push(self.alphabet[*s]);
    }
    out
  }

  /// Decode a booking reference back to its identity.
  ///
  /// Only canonical tokens are accepted: the token must re-encode to exactly
  /// the input, so mis-grouped or over-padded tokens are rejected.
  pub fn decode(&self, token: &str) -> Result<u64, CodecError> {
    let invalid = || CodecError::InvalidToken(token.to_owned());

    let mut symbols = Vec::with_capacity(token.len());
    for c in token.chars().rev() {
      if Some(c) == self.delimiter {
        continue;
      }
      let index = self.alphabet.iter().position(|a| *a == c).ok_or_else(invalid)?;
      symbols.push(index);
    }
    if symbols.is_empty() {
      return Err(invalid());
    }

    let digits = self.unscramble(&symbols);

    let base = self.base();
    let mut id: u64 = 0;
    for d in digits.iter().rev() {
      id = id
        .checked_mul(base)
        .and_then(|v| v.checked_add(*d as u64))
        .ok_or_else(invalid)?;
    }

    if self.encode(id) != token {
      return Err(invalid());
    }
    Ok(id)
  }

  // ── Scrambling ──────────────────────────────────────────────────────────
  //
  // Both directions walk positions from least significant upwards. The
  // accumulator depends only on the position and on symbols already
  // emitted, so `unscramble` can rebuild it step by step.

  fn next_acc(&self, acc: usize, symbol: usize, position: usize) -> usize {
    (acc * 7 + symbol * 3 + position + 1) % self.alphabet.len()
  }

  fn scramble(&self, digits: &[usize]) -> Vec<usize> {
    let n = self.alphabet.len();
    let mut acc = digits.len() % n;
    digits
      .iter()
      .enumerate()
      .map(|(p, d)| {
        let s = (d + acc) % n;
        acc = self.next_acc(acc, s, p);
        s
      })
      .collect()
  }

  fn unscramble(&self, symbols: &[usize]) -> Vec<usize> {
    let n = self.alphabet.len();
    let mut acc = symbols.len() % n;
    symbols
      .iter()
      .enumerate()
      .map(|(p, s)| {
        let d = (s + n - acc) % n;
        acc = self.next_acc(acc, *s, p);
        d
      })
      .collect()
  }
}
