//! Optimistic concurrency: etag redirects and the etag match check.

use std::collections::HashMap;

use folio_store::ReadableTables;
use folio_types::Etag;
use tracing::debug;

use crate::{
    document::is_delete_marker,
    error::{DocumentError, Result, WriteOperation},
    reader::DocumentReader,
};

/// Etags superseded by a touch, mapped to their successors.
///
/// Owned by one [`DocumentTransaction`](crate::DocumentTransaction) and
/// discarded with it.
#[derive(Debug, Clone, Default)]
pub struct EtagRedirects {
    redirects: HashMap<Etag, Etag>,
}

impl EtagRedirects {
    /// Creates an empty redirect table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `old` was replaced by `new`.
    pub fn insert(&mut self, old: Etag, new: Etag) {
        self.redirects.insert(old, new);
    }

    /// Follows redirects from `etag` until none applies.
    pub fn resolve(&self, mut etag: Etag) -> Etag {
        // A touch always issues a fresh etag, so chains cannot cycle. The
        // bound guards against a hand-built table that does.
        for _ in 0..=self.redirects.len() {
            match self.redirects.get(&etag) {
                Some(next) => etag = *next,
                None => break,
            }
        }
        etag
    }

    /// Number of recorded redirects.
    pub fn len(&self) -> usize {
        self.redirects.len()
    }

    /// Whether no redirect was recorded.
    pub fn is_empty(&self) -> bool {
        self.redirects.is_empty()
    }
}

/// Checks `expected` against the current etag of `normalized_key`.
///
/// Returns the current etag, or [`Etag::INVALID`] when the document does not
/// exist. `None` skips the check. The expected etag is first resolved through
/// `redirects`; an expected [`Etag::EMPTY`] also matches a delete marker.
///
/// # Errors
///
/// Returns [`DocumentError::Concurrency`] on mismatch, or
/// [`DocumentError::Corruption`] if the metadata record cannot be read.
pub fn ensure_etag_match<R: ReadableTables>(
    reader: &DocumentReader<'_, R>,
    redirects: &EtagRedirects,
    normalized_key: &str,
    expected: Option<Etag>,
    operation: WriteOperation,
) -> Result<Etag> {
    let Some(current) = reader.read_metadata(normalized_key)? else {
        return Ok(Etag::INVALID);
    };
    let Some(expected) = expected else {
        return Ok(current.etag);
    };

    let resolved = redirects.resolve(expected);
    if resolved == current.etag {
        return Ok(current.etag);
    }
    if resolved.is_empty()
        && is_delete_marker(&current.metadata, &reader.storage().config().delete_marker_field)
    {
        debug!(key = normalized_key, %operation, "Empty etag matched a delete marker");
        return Ok(current.etag);
    }

    Err(DocumentError::Concurrency {
        operation,
        key: current.key,
        actual: current.etag,
        expected: resolved,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use folio_types::EtagCategory;
    use proptest::prelude::*;

    use super::*;

    fn etag(changes: u64) -> Etag {
        Etag::new(EtagCategory::Documents, 1, changes)
    }

    #[test]
    fn test_resolve_follows_chain() {
        let mut redirects = EtagRedirects::new();
        redirects.insert(etag(1), etag(2));
        redirects.insert(etag(2), etag(5));

        assert_eq!(redirects.resolve(etag(1)), etag(5));
        assert_eq!(redirects.resolve(etag(2)), etag(5));
        assert_eq!(redirects.resolve(etag(3)), etag(3));
        assert_eq!(redirects.len(), 2);
    }

    #[test]
    fn test_resolve_terminates_on_cycle() {
        let mut redirects = EtagRedirects::new();
        redirects.insert(etag(1), etag(2));
        redirects.insert(etag(2), etag(1));
        let resolved = redirects.resolve(etag(1));
        assert!(resolved == etag(1) || resolved == etag(2));
    }

    proptest! {
        #[test]
        fn prop_resolve_reaches_chain_end(len in 1u64..32) {
            let mut redirects = EtagRedirects::new();
            for i in 0..len {
                redirects.insert(etag(i), etag(i + 1));
            }
            for i in 0..=len {
                prop_assert_eq!(redirects.resolve(etag(i)), etag(len));
            }
        }
    }
}
