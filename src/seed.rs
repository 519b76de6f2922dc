//! Deterministic seeding of phase randomness.
//!
//! Each phase body receives a [`PhaseRng`] instead of reaching for ambient
//! randomness. [`PhaseRng::call_seeded`] snapshots the generator, reseeds it
//! for the duration of one body and restores the snapshot on every exit path,
//! unwinding included.
//!
//! Seeds for a testset form a chain: setup runs on the initial seed, then
//! `test`, `test_teardown` and `teardown` seeds are each derived by drawing 16
//! bytes from a generator seeded with the previous link.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use sha2::{Digest, Sha256};

use crate::errors::HarnessError;

// Using a concrete, seedable PRNG for determinism.
type SmallRng = Xoshiro256StarStar;

pub const SEED_LEN: usize = 16;

/// A 16-byte seed, rendered as 32 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed(pub [u8; SEED_LEN]);

impl Seed {
    pub fn random() -> Self {
        let mut bytes = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Seed(bytes)
    }

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; SEED_LEN];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        Seed(bytes)
    }

    /// Next link of the chain: 16 bytes drawn from a generator seeded with `self`.
    pub fn derive(&self) -> Seed {
        let mut rng = self.generator();
        let mut bytes = [0u8; SEED_LEN];
        rng.fill_bytes(&mut bytes);
        Seed(bytes)
    }

    // Xoshiro256** wants 32 bytes; stretch through SHA-256 so that every seed bit
    // influences the whole state.
    fn generator(&self) -> SmallRng {
        let digest = Sha256::digest(self.0);
        let mut state = [0u8; 32];
        state.copy_from_slice(&digest);
        SmallRng::from_seed(state)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({})", self)
    }
}

impl FromStr for Seed {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| HarnessError::InvalidSeed {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        if s.len() != SEED_LEN * 2 {
            return Err(invalid("wrong length"));
        }
        let mut bytes = [0u8; SEED_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = s.get(i * 2..i * 2 + 2).ok_or_else(|| invalid("not ascii"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid("not hexadecimal"))?;
        }
        Ok(Seed(bytes))
    }
}

/// Per-phase seeds for one testset run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedChain {
    pub setup: Seed,
    pub test: Seed,
    pub test_teardown: Seed,
    pub teardown: Seed,
}

impl SeedChain {
    pub fn new(initial: Seed) -> Self {
        let test = initial.derive();
        let test_teardown = test.derive();
        let teardown = test_teardown.derive();
        Self {
            setup: initial,
            test,
            test_teardown,
            teardown,
        }
    }
}

/// The generator handed to phase bodies.
#[derive(Clone, Debug)]
pub struct PhaseRng {
    inner: SmallRng,
}

impl PhaseRng {
    pub fn from_entropy() -> Self {
        Self {
            inner: SmallRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: Seed) -> Self {
        Self {
            inner: seed.generator(),
        }
    }

    pub fn reseed(&mut self, seed: Seed) {
        self.inner = seed.generator();
    }

    /// Run `body` with the generator set to `seed`, then put the previous state
    /// back. `None` runs `body` against the current state unmodified.
    pub fn call_seeded<R>(&mut self, seed: Option<Seed>, body: impl FnOnce(&mut PhaseRng) -> R) -> R {
        let Some(seed) = seed else {
            return body(self);
        };
        let saved = self.inner.clone();
        let mut guard = Restore { rng: self, saved };
        guard.rng.reseed(seed);
        body(&mut *guard.rng)
    }
}

impl Default for PhaseRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RngCore for PhaseRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

struct Restore<'a> {
    rng: &'a mut PhaseRng,
    saved: SmallRng,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        self.rng.inner = self.saved.clone();
    }
}

/// Random identifier drawn from `[a-z0-9]`.
pub fn random_str(rng: &mut impl Rng, n: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..n)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
