//! The blob tree: an arena-backed overlay of the card's DO space, mirroring
//! `struct blob` from the original driver but trading parent/child/next
//! pointers for arena indices.

use crate::error::Error;
use crate::registry::DoInfo;

/// Index into a `BlobArena`. `0` is always the root.
pub type BlobId = usize;

/// What kind of node a blob is, mirroring the original's directory-vs-file
/// split (driven by whether the DO's tag is constructed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Directory,
    File,
}

/// Sticky three-state cache for a blob's content, replacing the original's
/// nullable-data-pointer-plus-status-flag pair. Once `Failed`, a blob never
/// retries the load on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCache {
    NotLoaded,
    Loaded(Vec<u8>),
    Failed(Error),
}

impl BlobCache {
    pub fn is_loaded(&self) -> bool {
        matches!(self, BlobCache::Loaded(_))
    }
}

/// A node in the blob tree.
#[derive(Debug, Clone)]
pub struct Blob {
    pub id: BlobId,
    pub parent: Option<BlobId>,
    pub children: Vec<BlobId>,
    pub tag: u16,
    pub kind: BlobKind,
    pub cache: BlobCache,
    /// Set once this blob's children have been populated by TLV expansion.
    pub expanded: bool,
}

impl Blob {
    fn new(id: BlobId, parent: Option<BlobId>, tag: u16, kind: BlobKind) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            tag,
            kind,
            cache: BlobCache::NotLoaded,
            expanded: false,
        }
    }
}

/// Depth cap applied by `walk_post_order`, matching the original driver's
/// guard against runaway recursion on a malformed card.
pub const MAX_BLOB_DEPTH: usize = 99;

/// Arena holding the whole tree. Blobs never move once allocated; removal
/// is not supported (the card session has no delete operation).
#[derive(Debug, Default)]
pub struct BlobArena {
    blobs: Vec<Blob>,
}

impl BlobArena {
    /// Build a fresh arena with a single root directory blob.
    pub fn new_root(root_tag: u16) -> Self {
        let mut arena = Self { blobs: Vec::new() };
        arena.blobs.push(Blob::new(0, None, root_tag, BlobKind::Directory));
        arena
    }

    pub fn get(&self, id: BlobId) -> Option<&Blob> {
        self.blobs.get(id)
    }

    pub fn get_mut(&mut self, id: BlobId) -> Option<&mut Blob> {
        self.blobs.get_mut(id)
    }

    pub fn root(&self) -> BlobId {
        0
    }

    /// Allocate a new child of `parent`, returning its id.
    pub fn alloc_child(&mut self, parent: BlobId, tag: u16, kind: BlobKind) -> BlobId {
        let id = self.blobs.len();
        self.blobs.push(Blob::new(id, Some(parent), tag, kind));
        self.blobs[parent].children.push(id);
        id
    }

    /// Find an immediate child of `parent` carrying `tag`, if already
    /// expanded into the tree.
    pub fn child_by_tag(&self, parent: BlobId, tag: u16) -> Option<BlobId> {
        self.blobs[parent]
            .children
            .iter()
            .copied()
            .find(|&cid| self.blobs[cid].tag == tag)
    }

    pub fn set_content(&mut self, id: BlobId, data: Vec<u8>) {
        self.blobs[id].cache = BlobCache::Loaded(data);
    }

    pub fn set_failed(&mut self, id: BlobId, err: Error) {
        self.blobs[id].cache = BlobCache::Failed(err);
    }

    /// Drop a blob's cached content back to `NotLoaded`, mirroring the
    /// per-node free step of `pgp_iterate_blobs`' teardown walk.
    pub fn clear_content(&mut self, id: BlobId) {
        self.blobs[id].cache = BlobCache::NotLoaded;
    }

    /// A read-only view of a file blob's bytes for the `read_binary` op.
    pub fn file_view(&self, id: BlobId) -> Result<&[u8], Error> {
        let blob = self.blobs.get(id).ok_or(Error::FileNotFound)?;
        match &blob.cache {
            BlobCache::Loaded(bytes) => Ok(bytes.as_slice()),
            BlobCache::Failed(e) => Err(e.clone()),
            BlobCache::NotLoaded => Err(Error::FileNotFound),
        }
    }

    /// Post-order walk of the subtree rooted at `start`, capped at
    /// `MAX_BLOB_DEPTH`, mirroring `pgp_iterate_blobs`.
    pub fn walk_post_order(&self, start: BlobId) -> Vec<BlobId> {
        let mut out = Vec::new();
        self.walk_inner(start, 0, &mut out);
        out
    }

    fn walk_inner(&self, id: BlobId, depth: usize, out: &mut Vec<BlobId>) {
        if depth >= MAX_BLOB_DEPTH {
            return;
        }
        let Some(blob) = self.blobs.get(id) else { return };
        for &child in &blob.children {
            self.walk_inner(child, depth + 1, out);
        }
        out.push(id);
    }
}

/// Map a DO registry entry's `constructed` flag onto a blob kind.
pub fn kind_for(info: &DoInfo) -> BlobKind {
    if info.constructed {
        BlobKind::Directory
    } else {
        BlobKind::File
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Build an arbitrary tree of the given shape by repeatedly attaching a
    /// child to a randomly chosen existing node, then assert the soundness
    /// invariants: every non-root node has exactly one parent pointer back
    /// to a real node, and post-order traversal never revisits a node.
    fn build_arena(attachments: &[usize]) -> BlobArena {
        let mut arena = BlobArena::new_root(0);
        for (i, &parent_pick) in attachments.iter().enumerate() {
            let existing = arena_node_count(&arena);
            let parent = parent_pick % existing;
            arena.alloc_child(parent, i as u16 + 1, BlobKind::Directory);
        }
        arena
    }

    fn arena_node_count(arena: &BlobArena) -> usize {
        let mut count = 1;
        while arena.get(count).is_some() {
            count += 1;
        }
        count
    }

    proptest! {
        #[test]
        fn tree_stays_sound_under_arbitrary_attachment(picks in proptest::collection::vec(0usize..1000, 0..64)) {
            let arena = build_arena(&picks);
            for blob in &arena.blobs {
                if blob.id != arena.root() {
                    let parent = blob.parent.expect("non-root has a parent");
                    let parent_blob = arena.get(parent).expect("parent exists");
                    prop_assert!(parent_blob.children.contains(&blob.id));
                }
            }
            let order = arena.walk_post_order(arena.root());
            let mut seen = std::collections::HashSet::new();
            for id in order {
                prop_assert!(seen.insert(id), "post-order must not revisit a node");
            }
        }

        #[test]
        fn cache_state_is_always_one_of_three_and_read_reflects_it(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut arena = BlobArena::new_root(0);
            let root = arena.root();
            prop_assert_eq!(arena.file_view(root), Err(Error::FileNotFound));
            arena.set_content(root, bytes.clone());
            prop_assert_eq!(arena.file_view(root), Ok(bytes.as_slice()));
            arena.set_failed(root, Error::ObjectInvalid);
            prop_assert_eq!(arena.file_view(root), Err(Error::ObjectInvalid));
        }
    }
}
