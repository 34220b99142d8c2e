//! Stanza identifiers.
//!
//! Identifiers look like ordinary v4 UUIDs, but six bits of the low half are
//! copied from the high half at positions chosen by a small interleave table.
//! The server checks for these markers.

use std::collections::HashSet;
use std::sync::Mutex;

use log::debug;
use uuid::Uuid;

const INTERLEAVE: [[u32; 2]; 4] = [[3, 6], [2, 5], [7, 1], [9, 5]];
const MARKER_BITS: u32 = 6;
const INDEX_START: u32 = 2;
const INDEX_STEP: u32 = 7;
const INDEX_MODULUS: u32 = 60;

/// Yields `(target bit in the low half, source bit in the high half)` for each marker.
fn marker_positions(msb: u64) -> impl Iterator<Item = (u32, u32)> {
    let pair = INTERLEAVE[(msb >> 62) as usize];
    (0..MARKER_BITS).scan(INDEX_START, move |index, i| {
        *index = (*index + INDEX_STEP) % INDEX_MODULUS;
        Some((*index + 2, pair[(i % 2) as usize] + 8 * i))
    })
}

/// Writes the marker bits derived from `msb` into `lsb`.
pub fn embed_markers(msb: u64, mut lsb: u64) -> u64 {
    for (target, source) in marker_positions(msb) {
        let bit = (msb >> source) & 1;
        lsb = (lsb & !(1u64 << target)) | (bit << target);
    }
    lsb
}

/// A fresh identifier in the protocol's hyphenated lowercase form.
pub fn generate_id() -> String {
    let (msb, lsb) = Uuid::new_v4().as_u64_pair();
    Uuid::from_u64_pair(msb, embed_markers(msb, lsb))
        .hyphenated()
        .to_string()
}

/// Whether `id` parses as a UUID and carries the expected marker bits.
pub fn verify_markers(id: &str) -> bool {
    match Uuid::try_parse(id) {
        Ok(uuid) => {
            let (msb, lsb) = uuid.as_u64_pair();
            embed_markers(msb, lsb) == lsb
        }
        Err(_) => false,
    }
}

/// Per-connection identifier source that never hands out the same id twice.
#[derive(Debug, Default)]
pub struct IdGenerator {
    issued: Mutex<HashSet<String>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let id = generate_id();
            if issued.insert(id.clone()) {
                return id;
            }
            debug!(target: "Id", "Regenerating colliding identifier {id}");
        }
    }

    /// Marks an externally supplied id as used, e.g. one echoed back for a receipt.
    pub fn reserve(&self, id: &str) -> bool {
        self.issued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string())
    }

    /// Forgets everything issued so far. Called when a new connection starts.
    pub fn reset(&self) {
        self.issued.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
