//! Character-window chunking with overlap, preferring natural boundaries.
//!
//! A window of `size` characters is cut at the last paragraph, line, sentence
//! or word boundary inside its second half; without one it is cut hard at
//! `size`. The next window starts `overlap` characters before the cut, so
//! chunk `i + 1` always begins with the last `overlap` characters of chunk `i`.

use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Boundaries are only accepted in the last half of a window.
const BOUNDARY_TOLERANCE: f32 = 0.5;

/// Separator and how many of its characters stay with the left chunk.
const SEPARATORS: [(&str, usize); 4] = [("\n\n", 0), ("\n", 0), (". ", 1), (" ", 0)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self { size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_CHUNK_OVERLAP }
    }
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Split `text` into ordered chunks. Empty or blank text yields none.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }
        if total <= self.size {
            return vec![chars.into_iter().collect()];
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let min_window = ((self.size as f32 * BOUNDARY_TOLERANCE) as usize).max(self.overlap + 1);

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < total {
            let hard_end = (start + self.size).min(total);
            if hard_end == total {
                chunks.push(chars[start..total].iter().collect());
                break;
            }
            let end = find_cut(&chars, start + min_window, hard_end);
            chunks.push(chars[start..end].iter().collect());

            start = end - self.overlap;
            if self.overlap == 0 {
                while start < total && chars[start].is_whitespace() {
                    start += 1;
                }
            }
        }
        chunks
    }
}

/// Convenience wrapper validating the parameters on every call.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(size, overlap)?.chunk(text))
}

/// Largest cut position in `[min_end, hard_end]` sitting on a separator,
/// trying coarser separators first; `hard_end` when none qualifies.
fn find_cut(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    for (sep, keep) in SEPARATORS {
        let pattern: Vec<char> = sep.chars().collect();
        let mut cut = hard_end;
        while cut >= min_end {
            if let Some(at) = cut.checked_sub(keep) {
                let matched = chars.get(at..at + pattern.len()).is_some_and(|w| w == pattern.as_slice());
                if matched {
                    return cut;
                }
            }
            if cut == 0 {
                break;
            }
            cut -= 1;
        }
    }
    hard_end
}
