//! Command APDU framing shared by the pubkey and crypto-op components.
//!
//! The original C driver rebuilds an `sc_apdu_t` inline in each of
//! `pgp_get_pubkey`, `pgp_get_data`, `pgp_compute_signature` and
//! `pgp_decipher`; this module factors the case 2 / case 4 shape out once.

/// A command APDU (CLA is always 0x00 for this driver).
#[derive(Debug, Clone)]
pub struct Apdu {
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: usize,
}

impl Apdu {
    /// Case 2: no command data, Le only (e.g. GET DATA).
    pub fn case2(ins: u8, p1: u8, p2: u8, le: usize) -> Self {
        Self {
            ins,
            p1,
            p2,
            data: Vec::new(),
            le,
        }
    }

    /// Case 4: command data and Le both present (e.g. PSO, INTERNAL AUTHENTICATE).
    pub fn case4(ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: usize) -> Self {
        Self { ins, p1, p2, data, le }
    }
}

/// `Le` is capped at 256 unless the card advertises extended APDU support,
/// in which case the caller's full buffer length is used.
pub fn le_for(out_len: usize, extended_apdu: bool) -> usize {
    if extended_apdu {
        out_len
    } else {
        out_len.min(256)
    }
}
