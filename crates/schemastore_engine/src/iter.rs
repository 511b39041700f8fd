//! Prefix iteration over engine snapshots.

/// A forward cursor over a materialized key range.
///
/// The cursor starts *before* the first entry; call [`EngineIter::next`]
/// to advance. Entries are copied out of the engine when the iterator is
/// created, so later writes are not observed.
#[derive(Debug, Default)]
pub struct EngineIter {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl EngineIter {
    pub(crate) fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries,
            position: None,
        }
    }

    /// Advances to the next entry. Returns `false` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.entries.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.entries.len());
            false
        }
    }

    /// Key of the current entry. Empty when not positioned on an entry.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.current().map_or(&[], |(k, _)| k.as_slice())
    }

    /// Value of the current entry. Empty when not positioned on an entry.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.current().map_or(&[], |(_, v)| v.as_slice())
    }

    /// Number of entries the iterator covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the iterator covers no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn current(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.position.and_then(|p| self.entries.get(p))
    }
}

/// Collects `(key, value)` pairs starting at `max(prefix, lower_bound)` while
/// keys share `prefix`.
pub(crate) fn collect_prefix<'a, I>(range: I, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>
where
    I: Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
{
    range
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Lowest key a prefix scan must visit.
pub(crate) fn start_key(prefix: &[u8], lower_bound: Option<&[u8]>) -> Vec<u8> {
    match lower_bound {
        Some(bound) if bound > prefix => bound.to_vec(),
        _ => prefix.to_vec(),
    }
}
