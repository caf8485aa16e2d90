//! Shared primitive types used across the entire audit.

/// A smart-card identifier, as printed on the transaction export.
pub type CardId = String;

/// An amount in Indonesian rupiah. Signed: UNBLOKIR corrections can carry
/// negative fares.
pub type Rupiah = i64;

/// A row position inside an [`crate::event::EventTable`].
pub type EventPos = usize;
