//! Lazy loading and TLV expansion of blob content, grounded on
//! `pgp_read_blob` and `pgp_enumerate_blob` in the original driver.

use crate::apdu::{le_for, Apdu};
use crate::blob::{kind_for, BlobArena, BlobId};
use crate::error::Error;
use crate::iso::{CardTransport, TlvParser};
use crate::pubkey;
use crate::registry::{lookup, GetFn};

const INS_GET_DATA: u8 = 0xCA;

/// Fetch a blob's raw content from the card if it hasn't been loaded (or
/// failed to load) yet, dispatching through the registry's `get_fn` the
/// same way `pgp_read_blob` invokes `b.info.get_fn` rather than always
/// issuing a plain GET DATA. Mirrors `pgp_read_blob`'s short-circuit on an
/// already-populated or already-poisoned cache entry.
pub fn lazy_read<T: CardTransport>(
    arena: &mut BlobArena,
    transport: &mut T,
    extended_apdu: bool,
    id: BlobId,
) -> Result<(), Error> {
    if let Some(blob) = arena.get(id) {
        if blob.cache.is_loaded() {
            return Ok(());
        }
        if matches!(blob.cache, crate::blob::BlobCache::Failed(_)) {
            return arena.file_view(id).map(|_| ());
        }
    } else {
        return Err(Error::FileNotFound);
    }

    let tag = arena.get(id).ok_or(Error::FileNotFound)?.tag;

    if matches!(lookup(tag), Some(info) if info.get == GetFn::PubkeyApdu) {
        return match pubkey::get_pubkey(transport, extended_apdu, tag) {
            Ok(data) => {
                arena.set_content(id, data);
                Ok(())
            }
            Err(err) => {
                arena.set_failed(id, err.clone());
                Err(err)
            }
        };
    }

    let apdu = Apdu::case2(INS_GET_DATA, (tag >> 8) as u8, (tag & 0xFF) as u8, le_for(0, extended_apdu));

    match transport.transmit(&apdu) {
        Ok((data, 0x90, 0x00)) => {
            arena.set_content(id, data);
            Ok(())
        }
        Ok((_, sw1, sw2)) => {
            let err = Error::CardError { sw1, sw2 };
            arena.set_failed(id, err.clone());
            Err(err)
        }
        Err(err) => {
            arena.set_failed(id, err.clone());
            Err(err)
        }
    }
}

/// Expand a constructed blob's content into immediate child blobs via the
/// TLV parser, replacing any previous children. Mirrors
/// `pgp_enumerate_blob`'s all-or-nothing commit: a parse failure leaves the
/// blob unexpanded rather than partially populated.
pub fn expand<P: TlvParser>(arena: &mut BlobArena, parser: &P, id: BlobId) -> Result<(), Error> {
    if arena.get(id).is_some_and(|b| b.expanded) {
        return Ok(());
    }
    let raw = arena.file_view(id)?.to_vec();
    let elements = parser.parse_children(&raw)?;

    let mut built = Vec::with_capacity(elements.len());
    for elem in &elements {
        let kind = match lookup(elem.tag) {
            Some(info) => kind_for(info),
            None => {
                if elem.constructed {
                    crate::blob::BlobKind::Directory
                } else {
                    crate::blob::BlobKind::File
                }
            }
        };
        built.push((elem.tag, kind, elem.value.clone()));
    }

    for (tag, kind, value) in built {
        let child = arena.alloc_child(id, tag, kind);
        arena.set_content(child, value);
    }
    if let Some(blob) = arena.get_mut(id) {
        blob.expanded = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobKind;
    use crate::iso::{AidSelectResult, BerTlvParser};

    struct StubTransport {
        response: Result<(Vec<u8>, u8, u8), Error>,
    }

    impl CardTransport for StubTransport {
        fn select_aid(&mut self, _aid: &[u8]) -> Result<AidSelectResult, Error> {
            unimplemented!()
        }
        fn transmit(&mut self, _apdu: &Apdu) -> Result<(Vec<u8>, u8, u8), Error> {
            self.response.clone()
        }
        fn atr(&self) -> &[u8] {
            &[]
        }
    }

    #[test]
    fn lazy_read_populates_cache_on_success() {
        let mut arena = BlobArena::new_root(0x3F00);
        let root = arena.root();
        let mut transport = StubTransport {
            response: Ok((vec![1, 2, 3], 0x90, 0x00)),
        };
        lazy_read(&mut arena, &mut transport, false, root).unwrap();
        assert_eq!(arena.file_view(root).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn lazy_read_is_sticky_on_failure() {
        let mut arena = BlobArena::new_root(0x3F00);
        let root = arena.root();
        let mut transport = StubTransport {
            response: Ok((vec![], 0x6A, 0x88)),
        };
        assert!(lazy_read(&mut arena, &mut transport, false, root).is_err());
        // A second attempt does not re-transmit; it replays the cached error.
        let mut transport2 = StubTransport {
            response: Ok((vec![9], 0x90, 0x00)),
        };
        assert!(lazy_read(&mut arena, &mut transport2, false, root).is_err());
    }

    #[test]
    fn expand_builds_children_from_tlv() {
        let mut arena = BlobArena::new_root(0x006E);
        let root = arena.root();
        arena.set_content(root, vec![0x5F, 0x52, 0x02, 0xAA, 0xBB]);
        if let Some(blob) = arena.get_mut(root) {
            blob.kind = BlobKind::Directory;
        }
        expand(&mut arena, &BerTlvParser, root).unwrap();
        let child = arena.child_by_tag(root, 0x5F52).unwrap();
        assert_eq!(arena.file_view(child).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn expand_is_idempotent() {
        let mut arena = BlobArena::new_root(0x006E);
        let root = arena.root();
        arena.set_content(root, vec![0x5F, 0x52, 0x01, 0xAA]);
        expand(&mut arena, &BerTlvParser, root).unwrap();
        expand(&mut arena, &BerTlvParser, root).unwrap();
        assert_eq!(arena.get(root).unwrap().children.len(), 1);
    }
}
