//! Published results: the client-visible value of each slot.
//!
//! Every slot owns a `watch` channel so observers can render results as
//! they arrive. Binary overlays are handed to a [`ResourceStore`], which
//! turns them into a displayable [`ResourceRef`].

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tokio::sync::watch;

use crate::error::Result;
use crate::stats::Statistics;
use crate::task::Slot;

pub const SVG_MIME: &str = "image/svg+xml";

/// Reference to a displayable resource (object URL, file path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishedResult {
    Overlay(ResourceRef),
    Statistics(Statistics),
}

impl PublishedResult {
    pub fn as_overlay(&self) -> Option<&ResourceRef> {
        match self {
            PublishedResult::Overlay(r) => Some(r),
            PublishedResult::Statistics(_) => None,
        }
    }

    pub fn as_statistics(&self) -> Option<&Statistics> {
        match self {
            PublishedResult::Statistics(s) => Some(s),
            PublishedResult::Overlay(_) => None,
        }
    }
}

/// Turns overlay bytes into something a viewer can display.
pub trait ResourceStore: Send + Sync {
    fn create(&self, slot: Slot, bytes: Vec<u8>, mime: &str) -> Result<ResourceRef>;

    /// Release a reference created by this store. Unknown references are ignored.
    fn revoke(&self, reference: &ResourceRef);
}

/// In-memory store handing out `blob:` style object URLs.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    objects: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes and MIME type behind a reference, if it is still alive.
    pub fn get(&self, reference: &ResourceRef) -> Option<(String, Vec<u8>)> {
        self.objects.get(reference.as_str()).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ResourceStore for MemoryResourceStore {
    fn create(&self, _slot: Slot, bytes: Vec<u8>, mime: &str) -> Result<ResourceRef> {
        let url = format!("blob:floorplan/{}", uuid::Uuid::new_v4());
        self.objects.insert(url.clone(), (mime.to_string(), bytes));
        Ok(ResourceRef(url))
    }

    fn revoke(&self, reference: &ResourceRef) {
        self.objects.remove(reference.as_str());
    }
}

/// Writes each overlay to `<dir>/<slot>.svg`, replacing the previous one.
#[derive(Debug, Clone)]
pub struct DirResourceStore {
    dir: PathBuf,
}

impl DirResourceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResourceStore for DirResourceStore {
    fn create(&self, slot: Slot, bytes: Vec<u8>, mime: &str) -> Result<ResourceRef> {
        let extension = if mime == SVG_MIME {
            "svg"
        } else {
            mime_guess::get_mime_extensions_str(mime)
                .and_then(|exts| exts.first())
                .copied()
                .unwrap_or("bin")
        };
        let path = self.dir.join(format!("{}.{}", slot, extension));
        std::fs::write(&path, bytes)?;
        Ok(ResourceRef(path.display().to_string()))
    }

    fn revoke(&self, reference: &ResourceRef) {
        let path = Path::new(reference.as_str());
        if path.starts_with(&self.dir)
            && let Err(e) = std::fs::remove_file(path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale overlay");
        }
    }
}

/// Slot → published result table.
pub struct ResultBoard {
    slots: [watch::Sender<Option<PublishedResult>>; 5],
}

impl Default for ResultBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultBoard {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| watch::Sender::new(None)),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<PublishedResult> {
        self.slots[slot.index()].borrow().clone()
    }

    pub fn subscribe(&self, slot: Slot) -> watch::Receiver<Option<PublishedResult>> {
        self.slots[slot.index()].subscribe()
    }

    pub fn snapshot(&self) -> Vec<(Slot, Option<PublishedResult>)> {
        Slot::ALL.iter().map(|&s| (s, self.get(s))).collect()
    }

    pub(crate) fn publish(&self, slot: Slot, result: PublishedResult) {
        self.slots[slot.index()].send_replace(Some(result));
    }

    /// Clear every slot, returning the previous values.
    pub(crate) fn reset(&self) -> Vec<PublishedResult> {
        self.slots
            .iter()
            .filter_map(|tx| tx.send_replace(None))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip_and_revoke() {
        let store = MemoryResourceStore::new();
        let reference = store
            .create(Slot::Walls, b"<svg/>".to_vec(), SVG_MIME)
            .unwrap();
        assert!(reference.as_str().starts_with("blob:floorplan/"));
        assert_eq!(
            store.get(&reference),
            Some((SVG_MIME.to_string(), b"<svg/>".to_vec()))
        );

        store.revoke(&reference);
        assert!(store.get(&reference).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_references_are_unique() {
        let store = MemoryResourceStore::new();
        let a = store.create(Slot::Icons, vec![1], SVG_MIME).unwrap();
        let b = store.create(Slot::Icons, vec![1], SVG_MIME).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn dir_store_writes_slot_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirResourceStore::new(dir.path().join("out")).unwrap();

        let reference = store
            .create(Slot::Spaces, b"<svg>spaces</svg>".to_vec(), SVG_MIME)
            .unwrap();
        let path = PathBuf::from(reference.as_str());
        assert_eq!(path, store.dir().join("spaces.svg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<svg>spaces</svg>");

        store.revoke(&reference);
        assert!(!path.exists());
        // Second revoke is a no-op.
        store.revoke(&reference);
    }

    #[test]
    fn dir_store_ignores_foreign_paths() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("keep.svg");
        std::fs::write(&outside, b"x").unwrap();

        let store = DirResourceStore::new(dir.path().join("out")).unwrap();
        store.revoke(&ResourceRef::new(outside.display().to_string()));
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn board_publishes_and_notifies() {
        let board = ResultBoard::new();
        let mut rx = board.subscribe(Slot::Walls);
        assert!(board.get(Slot::Walls).is_none());

        let reference = ResourceRef::new("blob:x");
        board.publish(Slot::Walls, PublishedResult::Overlay(reference.clone()));

        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().as_ref().and_then(|r| r.as_overlay()),
            Some(&reference)
        );
        assert!(board.get(Slot::Icons).is_none());
    }

    #[test]
    fn board_reset_returns_previous_values() {
        let board = ResultBoard::new();
        board.publish(Slot::Icons, PublishedResult::Overlay(ResourceRef::new("a")));
        board.publish(
            Slot::Statistics,
            PublishedResult::Statistics(Statistics::default()),
        );

        let previous = board.reset();
        assert_eq!(previous.len(), 2);
        assert!(board.snapshot().iter().all(|(_, r)| r.is_none()));
    }
}
