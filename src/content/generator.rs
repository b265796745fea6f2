//! Random payload generation
//!
//! Payloads are printable ASCII (`[0-9A-Za-z]`), so every test file is plain
//! text of exactly the configured length. Randomness comes from a seeded
//! `StdRng`; nothing here needs to be cryptographically strong.

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces fixed-length random text payloads
pub struct ContentGenerator {
    size: usize,
    rng: StdRng,
}

impl ContentGenerator {
    /// Create a generator seeded from the operating system
    pub fn new(size: usize) -> Self {
        Self {
            size,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create a generator with a fixed seed (reproducible output)
    pub fn with_seed(size: usize, seed: u64) -> Self {
        Self {
            size,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate the next payload
    pub fn next_payload(&mut self) -> Vec<u8> {
        let mut payload = vec![0u8; self.size];
        self.fill(&mut payload);
        payload
    }

    /// Overwrite `buf` with fresh random content
    pub fn fill(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.rng.sample(Alphanumeric);
        }
    }
}
