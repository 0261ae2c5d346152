//! The driver facade: lifecycle and the operations exposed to a host
//! framework, grounded on `pgp_init`/`pgp_finish` and the `sc_card_operations`
//! vtable entries in the original driver.

use crate::apdu::Apdu;
use crate::blob::{kind_for, BlobArena, BlobId, BlobKind};
use crate::crypto;
use crate::error::Error;
use crate::iso::{detect_extended_apdu, match_card, CardKind, CardTransport, PubkeyEncoder, TlvParser};
use crate::loader::lazy_read;
use crate::pubkey::{self, RsaPublicKey};
use crate::registry::{lookup, GetFn, PutFn, DO_REGISTRY};
use crate::resolver::{list_files as resolver_list_files, resolve_from};
use crate::secenv::{validate, SecurityEnv, SecurityEnvRequest};

const AID: &[u8] = &[0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];
const ROOT_TAG: u16 = 0x3F00;
const INS_VERIFY: u8 = 0x20;
/// Offset of the 6-byte card serial within a 16-byte AID-select response.
const SERIAL_OFFSET: usize = 8;
const SERIAL_LEN: usize = 6;

/// A path of DO tags to select, root-relative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectPath(pub Vec<u16>);

/// Outcome of a successful select, mirroring what `pgp_select_file`
/// reports back to the caller (the blob's kind, exposed as a file/dir
/// distinction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOutcome {
    pub blob: BlobId,
    pub kind: BlobKind,
}

/// Bytes read from a selected file blob, with the offset they were read
/// from (for callers validating `P5`-style read-bounds contracts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileView {
    pub offset: usize,
    pub data: Vec<u8>,
}

/// Which PIN the `pin_cmd` targets. The original ORs `0x80` into the PIN
/// reference for a global PIN; `UserPin`/`AdminPin` capture that split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
    User,
    Admin,
}

impl PinType {
    fn reference(self) -> u8 {
        match self {
            PinType::User => 0x81 | 0x80,
            PinType::Admin => 0x83 | 0x80,
        }
    }
}

/// `card_ctl` requests the driver understands; the original only supports
/// `SC_CARDCTL_GET_SERIALNR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardCtl {
    GetSerialNumber,
}

/// Asymmetric key slots the security environment and pubkey export index
/// by, matching the registry's `0xB6/0xB8/0xA4` CRT family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sign,
    Decrypt,
    Authenticate,
}

/// Algorithm capability flags surfaced alongside a key slot, kept as plain
/// constants rather than a bitflags dependency the rest of the stack
/// doesn't otherwise need.
pub const ALGO_FLAG_RSA: u32 = 0x0001;
pub const ALGO_FLAG_NEEDS_PADDING: u32 = 0x0002;

/// Static capability info paired with an `Algorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmInfo {
    pub algorithm: Algorithm,
    pub key_bits: u16,
    pub flags: u32,
}

/// The driver itself: owns the blob tree and the three external
/// collaborators (transport, TLV parser, pubkey encoder), generic over
/// their concrete types the way the teacher's filesystem is generic over
/// its storage backend.
pub struct OpenPgpCard<T, P, E> {
    arena: BlobArena,
    transport: T,
    parser: P,
    encoder: E,
    extended_apdu: bool,
    security_env: Option<SecurityEnv>,
    serial: Option<[u8; SERIAL_LEN]>,
}

/// Builder for `OpenPgpCard`, fluent in the same style as the teacher's
/// filesystem builder.
pub struct OpenPgpCardBuilder<T, P, E> {
    transport: T,
    parser: P,
    encoder: E,
}

impl<T: CardTransport, P: TlvParser, E: PubkeyEncoder> OpenPgpCardBuilder<T, P, E> {
    pub fn new(transport: T, parser: P, encoder: E) -> Self {
        Self { transport, parser, encoder }
    }

    pub fn build(self) -> OpenPgpCard<T, P, E> {
        OpenPgpCard {
            arena: BlobArena::new_root(ROOT_TAG),
            transport: self.transport,
            parser: self.parser,
            encoder: self.encoder,
            extended_apdu: false,
            security_env: None,
            serial: None,
        }
    }
}

impl<T: CardTransport, P: TlvParser, E: PubkeyEncoder> OpenPgpCard<T, P, E> {
    /// Match the attached card's ATR against the known OpenPGP card
    /// generations, mirroring `pgp_match_card`.
    pub fn match_card(&self) -> CardKind {
        match_card(self.transport.atr())
    }

    /// Select the applet and populate the root (MF) directory with the
    /// registry's top-level DOs, mirroring `pgp_init`. The MF itself has
    /// no readable content of its own, so its children are seeded from the
    /// registry rather than discovered by a GET DATA round trip. The AID
    /// response's bytes 8..14 (when present) are cached as the card serial,
    /// so `card_ctl(GetSerialNumber)` never needs a further round trip.
    /// Must be called before any other operation.
    pub fn init(&mut self) -> Result<(), Error> {
        let aid_result = self.transport.select_aid(AID)?;
        if aid_result.response.len() >= SERIAL_OFFSET + SERIAL_LEN {
            let mut serial = [0u8; SERIAL_LEN];
            serial.copy_from_slice(&aid_result.response[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN]);
            self.serial = Some(serial);
        }
        self.extended_apdu = detect_extended_apdu(self.transport.atr());
        let root = self.arena.root();
        if let Some(blob) = self.arena.get_mut(root) {
            blob.kind = BlobKind::Directory;
        }
        self.arena.set_content(root, Vec::new());
        for info in DO_REGISTRY {
            self.arena.alloc_child(root, info.tag, kind_for(info));
        }
        if let Some(blob) = self.arena.get_mut(root) {
            blob.expanded = true;
        }
        Ok(())
    }

    /// Tear down driver-local state. The original's `pgp_finish` walks the
    /// blob tree post-order freeing each node; here dropping the arena does
    /// the actual freeing for us, but the walk still runs to drop each
    /// blob's cached content up front, matching the original's traversal
    /// order and depth bound.
    pub fn finish(&mut self) -> Result<(), Error> {
        let root = self.arena.root();
        for id in self.arena.walk_post_order(root) {
            self.arena.clear_content(id);
        }
        self.security_env = None;
        Ok(())
    }

    /// Resolve and select a path of DO tags from the root, mirroring
    /// `pgp_select_file`.
    pub fn select_file(&mut self, path: &SelectPath) -> Result<SelectOutcome, Error> {
        let root = self.arena.root();
        let blob = resolve_from(
            &mut self.arena,
            &mut self.transport,
            &self.parser,
            self.extended_apdu,
            root,
            &path.0,
        )?;
        let kind = self.arena.get(blob).ok_or(Error::FileNotFound)?.kind;
        Ok(SelectOutcome { blob, kind })
    }

    /// List the immediate children of a selected directory blob, mirroring
    /// `pgp_list_files`.
    pub fn list_files(&mut self, dir: BlobId) -> Result<Vec<u16>, Error> {
        resolver_list_files(
            &mut self.arena,
            &mut self.transport,
            &self.parser,
            self.extended_apdu,
            dir,
        )
    }

    /// Read bytes from a previously selected file blob, mirroring
    /// `pgp_read_binary`. An offset past the end of the content is
    /// `IncorrectParameters` (offset equal to the length is valid and
    /// yields an empty read); `len` is clamped to whatever remains.
    pub fn read_binary(&mut self, file: BlobId, offset: usize, len: usize) -> Result<FileView, Error> {
        lazy_read(&mut self.arena, &mut self.transport, self.extended_apdu, file)?;
        let bytes = self.arena.file_view(file)?;
        if offset > bytes.len() {
            return Err(Error::IncorrectParameters);
        }
        let end = (offset + len).min(bytes.len());
        Ok(FileView { offset, data: bytes[offset..end].to_vec() })
    }

    /// Writing DOs back to the card is out of scope for this driver;
    /// mirrors the original only in that unsupported DOs return
    /// `SC_ERROR_NOT_SUPPORTED` — here every DO does, since card-side PUT
    /// DATA is not implemented.
    pub fn write_binary(&mut self, _file: BlobId, _offset: usize, _data: &[u8]) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    /// GET DATA by tag, dispatching through the registry the same way
    /// `pgp_get_data` does: generic DOs resolve against the blob tree,
    /// pubkey DOs go through the card-APDU or cached-PEM paths.
    pub fn get_data(&mut self, tag: u16) -> Result<Vec<u8>, Error> {
        let info = lookup(tag).ok_or(Error::FileNotFound)?;
        match info.get {
            GetFn::Generic => {
                let root = self.arena.root();
                let blob = resolve_from(
                    &mut self.arena,
                    &mut self.transport,
                    &self.parser,
                    self.extended_apdu,
                    root,
                    &[tag],
                )?;
                lazy_read(&mut self.arena, &mut self.transport, self.extended_apdu, blob)?;
                Ok(self.arena.file_view(blob)?.to_vec())
            }
            GetFn::PubkeyApdu => {
                pubkey::get_pubkey(&mut self.transport, self.extended_apdu, tag)
            }
            GetFn::PubkeyPem => {
                let root = self.arena.root();
                // Pseudo-DOs like 0xB601 sit in the 0xB600 CRT's slot; clear
                // the low bit to reach the CRT, then its 0x7F49 template.
                let blob = resolve_from(
                    &mut self.arena,
                    &mut self.transport,
                    &self.parser,
                    self.extended_apdu,
                    root,
                    &[tag & 0xFFFE, 0x7F49],
                )?;
                pubkey::get_pubkey_pem(&mut self.arena, &self.parser, &self.encoder, blob)
                    .map(|pem| pem.into_bytes())
            }
        }
    }

    /// Parse a cached `0x7F49` template blob into its modulus/exponent
    /// parts, for callers that want structured key material rather than PEM.
    pub fn parsed_pubkey(&mut self, template_blob: BlobId) -> Result<RsaPublicKey, Error> {
        let raw = self.arena.file_view(template_blob)?.to_vec();
        pubkey::parse_pubkey_template(&self.parser, &raw)
    }

    /// PUT DATA is uniformly refused by this driver; the registry still
    /// distinguishes `PutFn::Generic` from `PutFn::Refused` for fidelity to
    /// the original table shape, but neither path writes to the card.
    pub fn put_data(&mut self, tag: u16, _value: &[u8]) -> Result<(), Error> {
        let info = lookup(tag).ok_or(Error::FileNotFound)?;
        match info.put {
            PutFn::Generic | PutFn::Refused => Err(Error::NotSupported),
        }
    }

    /// Send a VERIFY command for the given PIN type, ORing the global-PIN
    /// bit into the reference as the original's `pgp_pin_cmd` does.
    pub fn pin_cmd(&mut self, pin_type: PinType, pin: &[u8]) -> Result<(), Error> {
        let apdu = Apdu::case4(INS_VERIFY, 0x00, pin_type.reference(), pin.to_vec(), 0);
        match self.transport.transmit(&apdu) {
            Ok((_, 0x90, 0x00)) => Ok(()),
            Ok((_, sw1, sw2)) => Err(Error::CardError { sw1, sw2 }),
            Err(err) => Err(err),
        }
    }

    /// Validate and install a new security environment for the given
    /// operation/key reference pair, mirroring `pgp_set_security_env`.
    pub fn set_security_env(&mut self, request: SecurityEnvRequest) -> Result<(), Error> {
        self.security_env = Some(validate(request)?);
        Ok(())
    }

    /// Compute a signature (or perform INTERNAL AUTHENTICATE) under the
    /// active security environment.
    pub fn compute_signature(&mut self, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let env = self.security_env.ok_or(Error::IncorrectParameters)?;
        crypto::compute_signature(&mut self.transport, self.extended_apdu, &env, digest)
    }

    /// Decipher a ciphertext under the active security environment.
    pub fn decipher(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let env = self.security_env.ok_or(Error::IncorrectParameters)?;
        crypto::decipher(&mut self.transport, self.extended_apdu, &env, ciphertext)
    }

    /// Driver-local control requests; only serial number retrieval is
    /// supported, matching `pgp_card_ctl`. Returns the serial cached from
    /// the AID response at `init` time rather than issuing a fresh APDU.
    pub fn card_ctl(&mut self, request: CardCtl) -> Result<Vec<u8>, Error> {
        match request {
            CardCtl::GetSerialNumber => {
                self.serial.map(|s| s.to_vec()).ok_or(Error::FileNotFound)
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::tests::*;
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    proptest! {
        /// Reading any offset/length pair from a fixed-size DO never panics,
        /// never returns more bytes than exist past the offset, errors for
        /// an offset past the end of the content, and otherwise clamps the
        /// read to whatever remains (offset == len is valid and empty).
        #[test]
        fn read_binary_clamps_to_content_bounds(
            content in proptest::collection::vec(any::<u8>(), 0..64),
            offset in 0usize..128,
            len in 0usize..128,
        ) {
            let mut by_tag = HashMap::new();
            by_tag.insert(0x0101, content.clone());
            let mut card = new_card(by_tag);
            card.init().unwrap();
            let value_blob = card.select_file(&SelectPath(vec![0x0101])).unwrap().blob;

            if offset > content.len() {
                prop_assert_eq!(card.read_binary(value_blob, offset, len), Err(Error::IncorrectParameters));
            } else {
                let view = card.read_binary(value_blob, offset, len).unwrap();
                prop_assert_eq!(view.offset, offset);
                prop_assert!(view.data.len() <= content.len() - offset);
                prop_assert!(view.data.len() <= len);
                prop_assert_eq!(&view.data[..], &content[offset..offset + view.data.len()]);
            }
        }
    }
}
