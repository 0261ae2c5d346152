//! Cryptographic card operations, grounded on `pgp_compute_signature` and
//! `pgp_decipher` in the original driver.

use crate::apdu::{le_for, Apdu};
use crate::error::Error;
use crate::iso::CardTransport;
use crate::secenv::{Operation, SecurityEnv};

const INS_PERFORM_SECURITY_OPERATION: u8 = 0x2A;
const INS_INTERNAL_AUTHENTICATE: u8 = 0x88;
const P1_COMPUTE_DIGITAL_SIGNATURE: u8 = 0x9E;
const P2_COMPUTE_DIGITAL_SIGNATURE: u8 = 0x9A;
const P1_DECIPHER: u8 = 0x80;
const P2_DECIPHER: u8 = 0x86;

/// Compute a digital signature (PSO: COMPUTE DIGITAL SIGNATURE) or perform
/// INTERNAL AUTHENTICATE, depending on the active environment's *key ref*
/// (`0x00` → signature, `0x02` → authentication) rather than its operation —
/// a `Sign` environment covers both key slots. Rejects any environment not
/// set up for `Sign`.
pub fn compute_signature<T: CardTransport>(
    transport: &mut T,
    extended_apdu: bool,
    env: &SecurityEnv,
    digest: &[u8],
) -> Result<Vec<u8>, Error> {
    if env.operation != Operation::Sign {
        return Err(Error::InvalidArguments);
    }
    let apdu = match env.key_ref {
        0x00 => Apdu::case4(
            INS_PERFORM_SECURITY_OPERATION,
            P1_COMPUTE_DIGITAL_SIGNATURE,
            P2_COMPUTE_DIGITAL_SIGNATURE,
            digest.to_vec(),
            le_for(256, extended_apdu),
        ),
        0x02 => Apdu::case4(
            INS_INTERNAL_AUTHENTICATE,
            0x00,
            0x00,
            digest.to_vec(),
            le_for(256, extended_apdu),
        ),
        _ => return Err(Error::InvalidArguments),
    };
    transmit_expect_ok(transport, &apdu)
}

/// Decipher a ciphertext (PSO: DECIPHER), prepending the 0x00 padding
/// indicator byte the original driver adds ahead of RSA-ciphertext data.
pub fn decipher<T: CardTransport>(
    transport: &mut T,
    extended_apdu: bool,
    env: &SecurityEnv,
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    if env.operation != Operation::Decipher {
        return Err(Error::InvalidArguments);
    }
    let mut data = Vec::with_capacity(ciphertext.len() + 1);
    data.push(0x00);
    data.extend_from_slice(ciphertext);
    let apdu = Apdu::case4(
        INS_PERFORM_SECURITY_OPERATION,
        P1_DECIPHER,
        P2_DECIPHER,
        data,
        le_for(256, extended_apdu),
    );
    transmit_expect_ok(transport, &apdu)
}

fn transmit_expect_ok<T: CardTransport>(transport: &mut T, apdu: &Apdu) -> Result<Vec<u8>, Error> {
    match transport.transmit(apdu) {
        Ok((data, 0x90, 0x00)) => Ok(data),
        Ok((_, sw1, sw2)) => Err(Error::CardError { sw1, sw2 }),
        Err(err) => Err(err),
    }
}
