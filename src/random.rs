//! Random payloads for the download stream and the upload test.
//!
//! Content is irrelevant to the measurement; only the length matters. The
//! OS generator is preferred and a seeded non-cryptographic generator takes
//! over when it is unavailable.

use bytes::Bytes;
use log::warn;
use rand::rngs::{OsRng, SmallRng};
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// `len` random bytes.
pub fn random_bytes(len: usize) -> Bytes {
    random_bytes_from(&mut OsRng, len)
}

pub(crate) fn random_bytes_from<R: RngCore>(primary: &mut R, len: usize) -> Bytes {
    let mut buf = vec![0u8; len];

    if let Err(e) = primary.try_fill_bytes(&mut buf) {
        warn!(
            "Secure random source unavailable ({}), using a non-cryptographic generator",
            e
        );
        SmallRng::seed_from_u64(clock_seed()).fill_bytes(&mut buf);
    }

    Bytes::from(buf)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}
