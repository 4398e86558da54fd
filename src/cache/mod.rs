// ============================================================================
// Cache Module
// ============================================================================
//
// Bounded in-memory order cache used as a read-through layer in front of the
// repository.
//
// ============================================================================

mod lru;

pub use lru::LruOrderCache;
