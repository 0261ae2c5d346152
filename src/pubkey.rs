//! Public key export, grounded on `pgp_get_pubkey` and `pgp_get_pubkey_pem`
//! in the original driver.

use crate::apdu::{le_for, Apdu};
use crate::blob::{BlobArena, BlobId};
use crate::error::Error;
use crate::iso::{CardTransport, PubkeyEncoder, TlvParser};
use crate::loader::expand;

const INS_GENERATE_ASYMMETRIC_KEY_PAIR: u8 = 0x47;
const P1_READ_PUBLIC_KEY: u8 = 0x81;

/// A resolved RSA public key, decomposed from the card's `0x7F49` DO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// Fetch the raw `0x7F49` public key template for the key at `crt` (the
/// 2-byte CRT tag identifying signature/decrypt/auth key slot) via the
/// card's GENERATE ASYMMETRIC KEY PAIR command in read mode.
pub fn get_pubkey<T: CardTransport>(
    transport: &mut T,
    extended_apdu: bool,
    crt: u16,
) -> Result<Vec<u8>, Error> {
    let data = vec![(crt >> 8) as u8, (crt & 0xFF) as u8];
    let apdu = Apdu::case4(
        INS_GENERATE_ASYMMETRIC_KEY_PAIR,
        P1_READ_PUBLIC_KEY,
        0x00,
        data,
        le_for(0, extended_apdu),
    );
    match transport.transmit(&apdu) {
        Ok((data, 0x90, 0x00)) => Ok(data),
        Ok((_, sw1, sw2)) => Err(Error::CardError { sw1, sw2 }),
        Err(err) => Err(err),
    }
}

/// Decompose a `0x7F49` public key template into modulus (`0x81`) and
/// exponent (`0x82`) components.
pub fn parse_pubkey_template<P: TlvParser>(parser: &P, raw: &[u8]) -> Result<RsaPublicKey, Error> {
    let elements = parser.parse_children(raw)?;
    let modulus = elements
        .iter()
        .find(|e| e.tag == 0x0081)
        .map(|e| e.value.clone())
        .ok_or(Error::ObjectInvalid)?;
    let exponent = elements
        .iter()
        .find(|e| e.tag == 0x0082)
        .map(|e| e.value.clone())
        .ok_or(Error::ObjectInvalid)?;
    Ok(RsaPublicKey { modulus, exponent })
}

/// Resolve `/raw_tag/0x7F49/{0x0081,0x0082}` from an already-cached key
/// template blob and render the key as PEM. Mirrors `pgp_get_pubkey_pem`'s
/// resolution against the blob tree rather than a fresh card round-trip.
pub fn get_pubkey_pem<P: TlvParser, E: PubkeyEncoder>(
    arena: &mut BlobArena,
    parser: &P,
    encoder: &E,
    template_blob: BlobId,
) -> Result<String, Error> {
    expand(arena, parser, template_blob)?;
    let modulus_id = arena.child_by_tag(template_blob, 0x0081).ok_or(Error::FileNotFound)?;
    let exponent_id = arena.child_by_tag(template_blob, 0x0082).ok_or(Error::FileNotFound)?;

    let modulus = arena.file_view(modulus_id)?;
    let exponent = arena.file_view(exponent_id)?;
    let der = crate::iso::der_sequence(
        &[
            crate::iso::der_integer(modulus),
            crate::iso::der_integer(exponent),
        ]
        .concat(),
    );
    encoder.to_pem(&der)
}
