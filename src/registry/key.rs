//! Stream identifiers and key allocation
//!
//! Stream ids are short strings drawn without replacement from an alphabet
//! that leaves out glyphs people misread when copying a URL (`i`, `l`, `o`,
//! `n`, `v`, `0`, `1`).

use std::borrow::Borrow;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters a stream id may contain
pub const KEY_CHARS: &[u8] = b"abcdefghjkmpqrstuwxyz23456789";

/// Length of the first id tried
pub const INITIAL_KEY_LENGTH: usize = 4;

/// Identifier for one producer's broadcast stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Wrap an existing id (e.g. one received from a client)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Allocate a stream id not rejected by `is_taken`
///
/// Starts at [`INITIAL_KEY_LENGTH`] and grows by one character on every
/// collision, up to `max_len` (clamped to the alphabet size). Uniqueness only
/// holds against the snapshot `is_taken` sees; the caller must allocate and
/// register under the same lock.
pub fn allocate<R, F>(rng: &mut R, max_len: usize, is_taken: F) -> StreamId
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    let max_len = max_len.clamp(INITIAL_KEY_LENGTH, KEY_CHARS.len());
    let mut len = INITIAL_KEY_LENGTH;

    loop {
        let candidate = draw(rng, len);
        if !is_taken(&candidate) {
            return StreamId(candidate);
        }
        len = (len + 1).min(max_len);
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    KEY_CHARS
        .choose_multiple(rng, len)
        .map(|&b| b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_initial_length_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = allocate(&mut rng, KEY_CHARS.len(), |_| false);

        assert_eq!(id.len(), INITIAL_KEY_LENGTH);
        assert!(id.as_str().bytes().all(|b| KEY_CHARS.contains(&b)));
    }

    #[test]
    fn test_no_repeated_characters() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let id = allocate(&mut rng, KEY_CHARS.len(), |_| false);
            let unique: HashSet<char> = id.as_str().chars().collect();
            assert_eq!(unique.len(), id.len());
        }
    }

    #[test]
    fn test_ambiguous_glyphs_excluded() {
        for c in ['i', 'l', 'o', 'n', 'v', '0', '1'] {
            assert!(!KEY_CHARS.contains(&(c as u8)), "{} should be excluded", c);
        }
    }

    #[test]
    fn test_collision_grows_length() {
        let mut rng = StdRng::seed_from_u64(3);
        let calls = Cell::new(0);

        // Reject the first two candidates
        let id = allocate(&mut rng, KEY_CHARS.len(), |_| {
            calls.set(calls.get() + 1);
            calls.get() <= 2
        });

        assert_eq!(calls.get(), 3);
        assert_eq!(id.len(), INITIAL_KEY_LENGTH + 2);
    }

    #[test]
    fn test_never_returns_existing() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut existing: HashSet<StreamId> = HashSet::new();

        for _ in 0..2_000 {
            let tried = RefCell::new(Vec::new());
            let id = allocate(&mut rng, KEY_CHARS.len(), |k| {
                tried.borrow_mut().push(k.len());
                existing.contains(k)
            });
            let tried = tried.into_inner();

            assert!(!existing.contains(&id));
            // Candidate length never shrinks within a call, and grows by one
            // per collision
            assert!(tried.windows(2).all(|w| w[0] <= w[1]));
            let collisions = tried.len() - 1;
            assert_eq!(id.len(), INITIAL_KEY_LENGTH + collisions);
            existing.insert(id);
        }

        assert_eq!(existing.len(), 2_000);
    }

    #[test]
    fn test_freed_id_can_come_back() {
        let first = allocate(&mut StdRng::seed_from_u64(9), 4, |_| false);

        // Same draw while the id is live collides, and once it is gone succeeds
        let live: HashSet<StreamId> = [first.clone()].into_iter().collect();
        let again = allocate(&mut StdRng::seed_from_u64(9), 4, |k| live.contains(k));
        assert_ne!(again, first);

        let reused = allocate(&mut StdRng::seed_from_u64(9), 4, |_| false);
        assert_eq!(reused, first);
    }

    #[test]
    fn test_length_capped() {
        let mut rng = StdRng::seed_from_u64(5);
        let calls = Cell::new(0);

        let id = allocate(&mut rng, 6, |_| {
            calls.set(calls.get() + 1);
            calls.get() <= 10
        });

        assert_eq!(id.len(), 6);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = StreamId::new("ab3q");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ab3q\"");
    }
}
