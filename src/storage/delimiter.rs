//! Delimiter negotiation.
//!
//! Each persisted list is joined into one string, so the joining character
//! must never occur inside a value. The [`Delimiters`] type walks an ordered
//! list of candidates and retires ("kills") any candidate found in the data.

use tracing::debug;

/// The candidates used when none are given explicitly.
///
/// All are characters that rarely occur in ordinary text.
pub const DEFAULT_CANDIDATES: [char; 5] = ['▪', '\u{1F}', '\u{1E}', '\u{1D}', '¦'];

/// Every candidate delimiter collides with the data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("All delimiter candidates {candidates:?} occur in the stored values")]
pub struct Exhausted {
    /// The candidates that were tried.
    pub candidates: Vec<char>,
}

/// An ordered set of candidate delimiters with one active choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    candidates: Vec<char>,
    /// Index of the active candidate. Everything before it is dead.
    active: usize,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.to_vec(),
            active: 0,
        }
    }
}

impl Delimiters {
    /// Creates a negotiator over `candidates`, in order of preference.
    ///
    /// Duplicate candidates are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if `candidates` is empty.
    pub fn new(candidates: impl IntoIterator<Item = char>) -> Result<Self, Exhausted> {
        let mut unique = Vec::new();
        for c in candidates {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }

        if unique.is_empty() {
            return Err(Exhausted { candidates: unique });
        }

        Ok(Self {
            candidates: unique,
            active: 0,
        })
    }

    /// The delimiter currently used to join values.
    #[must_use]
    pub fn active(&self) -> char {
        self.candidates[self.active]
    }

    /// All candidates, in order of preference.
    #[must_use]
    pub fn candidates(&self) -> &[char] {
        &self.candidates
    }

    /// Candidates that have been retired because they occurred in the data.
    #[must_use]
    pub fn dead(&self) -> &[char] {
        &self.candidates[..self.active]
    }

    /// Ensures the active delimiter occurs in none of `texts`.
    ///
    /// On a collision the active candidate is retired and the next one is
    /// tried against every text. Returns the (possibly new) active
    /// delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if every remaining candidate collides. The
    /// negotiator is left unchanged in that case.
    pub fn negotiate<'a, I>(&mut self, texts: I) -> Result<char, Exhausted>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let texts = texts.into_iter();
        let mut index = self.active;

        while let Some(&candidate) = self.candidates.get(index) {
            if texts.clone().any(|text| text.contains(candidate)) {
                debug!(?candidate, "delimiter collides with stored data");
                index += 1;
                continue;
            }

            if index != self.active {
                debug!(from = ?self.active(), to = ?candidate, "switching delimiter");
                self.active = index;
            }
            return Ok(candidate);
        }

        Err(Exhausted {
            candidates: self.candidates.clone(),
        })
    }
}
