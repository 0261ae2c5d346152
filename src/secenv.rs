//! Security environment state machine, grounded on `pgp_set_security_env`
//! in the original driver.

use crate::error::Error;

/// The cryptographic operation a security environment is being set up for.
/// `Sign` covers both the signature key (ref `0x00`) and the authentication
/// key (ref `0x02`); which APDU that turns into is decided in `crypto` by
/// the key ref, not by a separate operation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sign,
    Decipher,
}

/// The algorithm a security environment request names, if any. This driver
/// only ever supports RSA; `Other` represents any other algorithm reference
/// the caller might pass, which is always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecAlgorithm {
    Rsa,
    Other,
}

/// The reference used to select the security environment, mirroring
/// `sc_security_env_t` in OpenSC's model: `operation`, an optional
/// `algorithm`, a `key_ref` (required to be exactly one byte), and an
/// optional `file_ref` (not supported by this driver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityEnvRequest {
    pub operation: Operation,
    pub algorithm: Option<SecAlgorithm>,
    pub key_ref: Vec<u8>,
    pub file_ref: Option<Vec<u8>>,
}

/// The currently active security environment, set by `set_security_env`
/// and consulted by the crypto ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityEnv {
    pub operation: Operation,
    pub key_ref: u8,
}

/// Key references valid for each operation, matching the compatibility
/// table enforced in `pgp_set_security_env` (signature key 0x00, auth key
/// 0x02, decrypt key 0x01).
fn valid_key_ref(operation: Operation, key_ref: u8) -> bool {
    match operation {
        Operation::Sign => key_ref == 0x00 || key_ref == 0x02,
        Operation::Decipher => key_ref == 0x01,
    }
}

/// Validate and install a new security environment.
///
/// Shape violations — a named algorithm that isn't RSA, a key ref that
/// isn't exactly one byte, or a file ref at all — are rejected with
/// `InvalidArguments`, mirroring `SC_ERROR_INVALID_ARGUMENTS` in the
/// original's request-shape checks. An operation/key-ref pair the card
/// doesn't support (shape is fine, combination isn't) is rejected with
/// `NotSupported`, mirroring `SC_ERROR_NOT_SUPPORTED`.
pub fn validate(request: SecurityEnvRequest) -> Result<SecurityEnv, Error> {
    if matches!(request.algorithm, Some(SecAlgorithm::Other)) {
        return Err(Error::InvalidArguments);
    }
    if request.file_ref.is_some() {
        return Err(Error::InvalidArguments);
    }
    if request.key_ref.len() != 1 {
        return Err(Error::InvalidArguments);
    }
    let key_ref = request.key_ref[0];
    if !valid_key_ref(request.operation, key_ref) {
        return Err(Error::NotSupported);
    }
    Ok(SecurityEnv {
        operation: request.operation,
        key_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(operation: Operation, key_ref: u8) -> SecurityEnvRequest {
        SecurityEnvRequest { operation, algorithm: None, key_ref: vec![key_ref], file_ref: None }
    }

    #[test]
    fn sign_accepts_signature_key_ref() {
        assert!(validate(req(Operation::Sign, 0x00)).is_ok());
    }

    #[test]
    fn sign_accepts_authentication_key_ref() {
        assert!(validate(req(Operation::Sign, 0x02)).is_ok());
    }

    #[test]
    fn sign_rejects_decipher_key_ref() {
        assert_eq!(validate(req(Operation::Sign, 0x01)), Err(Error::NotSupported));
    }

    #[test]
    fn decipher_accepts_only_key_ref_one() {
        assert!(validate(req(Operation::Decipher, 0x01)).is_ok());
        assert_eq!(validate(req(Operation::Decipher, 0x02)), Err(Error::NotSupported));
    }

    #[test]
    fn non_rsa_algorithm_is_rejected_as_invalid_arguments() {
        let request = SecurityEnvRequest {
            operation: Operation::Sign,
            algorithm: Some(SecAlgorithm::Other),
            key_ref: vec![0x00],
            file_ref: None,
        };
        assert_eq!(validate(request), Err(Error::InvalidArguments));
    }

    #[test]
    fn rsa_algorithm_is_accepted() {
        let request = SecurityEnvRequest {
            operation: Operation::Sign,
            algorithm: Some(SecAlgorithm::Rsa),
            key_ref: vec![0x00],
            file_ref: None,
        };
        assert!(validate(request).is_ok());
    }

    #[test]
    fn key_ref_length_other_than_one_is_invalid_arguments() {
        let request = SecurityEnvRequest {
            operation: Operation::Sign,
            algorithm: None,
            key_ref: vec![0x00, 0x01],
            file_ref: None,
        };
        assert_eq!(validate(request), Err(Error::InvalidArguments));
    }

    #[test]
    fn file_ref_present_is_invalid_arguments() {
        let request = SecurityEnvRequest {
            operation: Operation::Sign,
            algorithm: None,
            key_ref: vec![0x00],
            file_ref: Some(vec![0x3F, 0x00]),
        };
        assert_eq!(validate(request), Err(Error::InvalidArguments));
    }
}
