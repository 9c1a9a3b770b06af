//! Clipboard domain entities shared by every clipboard peer.
//!
//! # The clipboard model (for beginners)
//!
//! Desktop environments have several independent clipboards, called
//! *selections*.  Each selection has at most one *owner* at a time: the peer
//! that most recently announced "I have data for this selection".  Owners do
//! not push their data eagerly.  They only advertise which data *types* they
//! can supply, and the data itself is fetched lazily when another peer asks
//! for it.
//!
//! A [`ClipboardInfo`] is an immutable snapshot of one selection: who owns it,
//! which types are available, and whatever data has been delivered so far.
//! Snapshots are shared as `Arc<ClipboardInfo>` and never mutated in place.
//! Any change produces a new snapshot.
//!
//! # Generations
//!
//! The broker stamps every ownership change with a monotonically increasing
//! *generation*.  Two snapshots with the same generation describe the same
//! ownership (the later one may carry more data); a different generation is
//! a new owner.  Peers compare generations by value to tell "new grab" from
//! "data arrived".

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Peer identity ─────────────────────────────────────────────────────────────

/// Identity of a clipboard peer registered with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Creates a fresh random peer identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Selections ────────────────────────────────────────────────────────────────

/// One of the three independent clipboard slots.
///
/// The discriminants are the wire codes used by the guest agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Selection {
    /// The explicit copy/paste clipboard (Ctrl+C / Ctrl+V).
    Clipboard = 0,
    /// The X11-style "last highlighted text" selection.
    Primary = 1,
    /// The rarely used secondary selection.
    Secondary = 2,
}

impl Selection {
    /// Number of selections.
    pub const COUNT: usize = 3;

    /// All selections in index order.
    pub const ALL: [Selection; Selection::COUNT] =
        [Selection::Clipboard, Selection::Primary, Selection::Secondary];

    /// Dense index for per-selection arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Selection::Clipboard => "clipboard",
            Selection::Primary => "primary",
            Selection::Secondary => "secondary",
        }
    }
}

impl TryFrom<u8> for Selection {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Selection::Clipboard),
            1 => Ok(Selection::Primary),
            2 => Ok(Selection::Secondary),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Host clipboard types ──────────────────────────────────────────────────────

/// Data types the host clipboard understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipboardType {
    /// UTF-8 encoded text.
    Text,
}

impl ClipboardType {
    /// Number of host clipboard types.
    pub const COUNT: usize = 1;

    /// All host types in index order.
    pub const ALL: [ClipboardType; ClipboardType::COUNT] = [ClipboardType::Text];

    /// Dense index for per-type arrays.
    pub fn index(self) -> usize {
        match self {
            ClipboardType::Text => 0,
        }
    }

    fn bit(self) -> u32 {
        1 << self.index()
    }
}

impl fmt::Display for ClipboardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardType::Text => f.write_str("text"),
        }
    }
}

/// A small bitset of [`ClipboardType`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipboardTypeSet(u32);

impl ClipboardTypeSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Adds `ty` to the set.
    pub fn insert(&mut self, ty: ClipboardType) {
        self.0 |= ty.bit();
    }

    /// Removes `ty`, returning whether it was present.
    pub fn remove(&mut self, ty: ClipboardType) -> bool {
        let present = self.contains(ty);
        self.0 &= !ty.bit();
        present
    }

    /// Returns `true` if `ty` is in the set.
    pub fn contains(&self, ty: ClipboardType) -> bool {
        self.0 & ty.bit() != 0
    }

    /// Removes every type.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns `true` if no type is present.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates the contained types in index order.
    pub fn iter(&self) -> impl Iterator<Item = ClipboardType> + '_ {
        ClipboardType::ALL.into_iter().filter(|ty| self.contains(*ty))
    }
}

// ── Clipboard snapshot ────────────────────────────────────────────────────────

/// Availability and (lazily delivered) data for one clipboard type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSlot {
    /// The owner can supply this type.
    pub available: bool,
    /// Data delivered so far, if any.
    pub data: Option<Arc<[u8]>>,
}

impl TypeSlot {
    /// Size of the delivered data in bytes (0 when nothing was delivered).
    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }
}

/// Immutable snapshot of one selection's ownership and data.
///
/// Build one with [`ClipboardInfo::new`] and the `with_*` methods, then hand
/// it to the broker, which stamps the generation.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::domain::clipboard::{ClipboardInfo, ClipboardType, PeerId, Selection};
///
/// let owner = PeerId::new();
/// let info = ClipboardInfo::new(Some(owner), Selection::Clipboard)
///     .with_available(ClipboardType::Text);
/// assert!(info.is_available(ClipboardType::Text));
/// assert!(info.data(ClipboardType::Text).is_none());
/// assert!(info.is_owned_by(owner));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardInfo {
    owner: Option<PeerId>,
    selection: Selection,
    generation: u64,
    types: [TypeSlot; ClipboardType::COUNT],
}

impl ClipboardInfo {
    /// Creates an unstamped snapshot with no available types.
    pub fn new(owner: Option<PeerId>, selection: Selection) -> Self {
        Self {
            owner,
            selection,
            generation: 0,
            types: Default::default(),
        }
    }

    /// Returns a copy with `ty` marked available.
    pub fn with_available(mut self, ty: ClipboardType) -> Self {
        self.types[ty.index()].available = true;
        self
    }

    /// Returns a copy carrying `data` for `ty` (which also becomes available).
    ///
    /// The generation is preserved: data delivery is not an ownership change.
    pub fn with_data(mut self, ty: ClipboardType, data: impl Into<Arc<[u8]>>) -> Self {
        let slot = &mut self.types[ty.index()];
        slot.available = true;
        slot.data = Some(data.into());
        self
    }

    /// Returns a copy stamped with `generation`.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// The owning peer, or `None` for an empty (released) selection.
    pub fn owner(&self) -> Option<PeerId> {
        self.owner
    }

    /// Returns `true` if `peer` owns this snapshot.
    pub fn is_owned_by(&self, peer: PeerId) -> bool {
        self.owner == Some(peer)
    }

    /// The selection this snapshot describes.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Ownership generation assigned by the broker (0 before publishing).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The slot for `ty`.
    pub fn slot(&self, ty: ClipboardType) -> &TypeSlot {
        &self.types[ty.index()]
    }

    /// Returns `true` if the owner advertised `ty`.
    pub fn is_available(&self, ty: ClipboardType) -> bool {
        self.slot(ty).available
    }

    /// Delivered data for `ty`, if any.
    pub fn data(&self, ty: ClipboardType) -> Option<&[u8]> {
        self.slot(ty).data.as_deref()
    }

    /// Iterates every advertised type.
    pub fn available_types(&self) -> impl Iterator<Item = ClipboardType> + '_ {
        ClipboardType::ALL
            .into_iter()
            .filter(|ty| self.is_available(*ty))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
