//! Path resolution over the blob tree, grounded on `pgp_get_blob` and
//! `pgp_select_file`/`pgp_list_files` in the original driver.

use crate::blob::{BlobArena, BlobId, BlobKind};
use crate::error::Error;
use crate::iso::{CardTransport, TlvParser};
use crate::loader::{expand, lazy_read};

/// Resolve a path of tags starting from `start`, expanding and lazily
/// reading directory blobs along the way as needed.
///
/// Mirrors `pgp_get_blob`: child lookup triggers expansion of the parent if
/// it hasn't been expanded yet, and a lazy-read failure on the *found*
/// child is swallowed here — selection still succeeds, with the failure
/// surfacing later from whatever tries to actually use the child's
/// content. This matches the original's `(void) pgp_read_blob(...)` call.
pub fn resolve_from<T: CardTransport, P: TlvParser>(
    arena: &mut BlobArena,
    transport: &mut T,
    parser: &P,
    extended_apdu: bool,
    start: BlobId,
    path: &[u16],
) -> Result<BlobId, Error> {
    let mut current = start;
    let path = match (path.first(), arena.get(start)) {
        (Some(&first), Some(root)) if first == root.tag => &path[1..],
        _ => path,
    };
    for &tag in path {
        if arena.get(current).is_none_or(|b| b.kind != BlobKind::Directory) {
            return Err(Error::ObjectInvalid);
        }
        lazy_read(arena, transport, extended_apdu, current)?;
        expand(arena, parser, current)?;

        let child = arena
            .child_by_tag(current, tag)
            .ok_or(Error::FileNotFound)?;

        // Selection succeeds even if the child's own content fails to load;
        // the error is cached and only observed by a later read.
        let _ = lazy_read(arena, transport, extended_apdu, child);
        current = child;
    }
    Ok(current)
}

/// List the tags of the immediate children of a directory blob. Returns
/// `ObjectInvalid` for a non-directory blob, matching
/// `SC_ERROR_OBJECT_NOT_VALID` from `pgp_list_files`.
pub fn list_files<T: CardTransport, P: TlvParser>(
    arena: &mut BlobArena,
    transport: &mut T,
    parser: &P,
    extended_apdu: bool,
    id: BlobId,
) -> Result<Vec<u16>, Error> {
    if arena.get(id).is_none_or(|b| b.kind != BlobKind::Directory) {
        return Err(Error::ObjectInvalid);
    }
    lazy_read(arena, transport, extended_apdu, id)?;
    expand(arena, parser, id)?;
    let blob = arena.get(id).ok_or(Error::FileNotFound)?;
    Ok(blob.children.iter().filter_map(|&c| arena.get(c)).map(|b| b.tag).collect())
}
