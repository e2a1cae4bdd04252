//! Where completed parts go once the state machine finishes building them.
//!
//! A [`PartSink`] keeps two views onto the same parts: an ordered list (wire order, for
//! iteration) and a case-insensitive by-name multi-map (for `get_all`/`get_first` lookup). The
//! map stores indices into the ordered list rather than a second copy of each part, so "a part
//! appears in the list iff it appears in the map" holds by construction.

use crate::factory::PartFactory;
use crate::part::Part;
use std::collections::HashMap;

/// The ordered-list-plus-by-name-index collection completed parts are appended to.
#[derive(Debug, Default)]
pub(crate) struct PartSink {
    parts: Vec<Part>,
    by_name: HashMap<String, Vec<usize>>,
    rank: usize,
}

impl PartSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a newly completed part, recording it under its lower-cased name.
    pub(crate) fn append(&mut self, part: Part) {
        let key = part.name().to_ascii_lowercase();
        let index = self.parts.len();
        self.parts.push(part);
        self.by_name.entry(key).or_default().push(index);
    }

    /// Returns the next unread part and advances the iteration cursor, or `None` if the cursor
    /// has caught up with every completed part so far.
    pub(crate) fn iterate(&mut self) -> Option<&Part> {
        if self.rank >= self.parts.len() {
            return None;
        }
        let part = &self.parts[self.rank];
        self.rank += 1;
        Some(part)
    }

    pub(crate) fn has_next(&self) -> bool {
        self.rank < self.parts.len()
    }

    pub(crate) fn get_all(&self, name: &str) -> Vec<&Part> {
        self.by_name.get(&name.to_ascii_lowercase()).map(|idxs| idxs.iter().map(|&i| &self.parts[i]).collect()).unwrap_or_default()
    }

    pub(crate) fn get_first(&self, name: &str) -> Option<&Part> {
        let idxs = self.by_name.get(&name.to_ascii_lowercase())?;
        idxs.first().map(|&i| &self.parts[i])
    }

    /// Hands every part at or past the iteration cursor back to `factory` for release, then
    /// drops this sink's own references to them (the by-name map is cleared along with the
    /// list; already-iterated parts are left untouched since the caller owns them).
    pub(crate) fn release_unread(&mut self, factory: &mut dyn PartFactory) {
        if self.rank >= self.parts.len() {
            return;
        }
        let unread = self.parts.split_off(self.rank);
        factory.release_all(&unread);
        self.by_name.retain(|_, idxs| {
            idxs.retain(|&i| i < self.rank);
            !idxs.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::InMemoryFactory;
    use crate::part::Attribute;

    fn attr(name: &str, value: &str) -> Part {
        let mut a = Attribute::new(name.to_string(), None, None);
        a.add_content(value.as_bytes(), true, encoding::all::UTF_8).unwrap();
        Part::Attribute(a)
    }

    #[test]
    fn append_and_iterate_preserves_order() {
        let mut sink = PartSink::new();
        sink.append(attr("a", "1"));
        sink.append(attr("b", "2"));
        assert_eq!(sink.iterate().unwrap().name(), "a");
        assert_eq!(sink.iterate().unwrap().name(), "b");
        assert!(sink.iterate().is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut sink = PartSink::new();
        sink.append(attr("Name", "v"));
        assert_eq!(sink.get_all("name").len(), 1);
        assert_eq!(sink.get_first("NAME").unwrap().name(), "Name");
    }

    #[test]
    fn map_and_list_stay_consistent_after_release() {
        let mut sink = PartSink::new();
        sink.append(attr("a", "1"));
        sink.append(attr("b", "2"));
        sink.iterate();
        let mut factory = InMemoryFactory;
        sink.release_unread(&mut factory);
        assert!(sink.get_all("b").is_empty());
        assert_eq!(sink.get_all("a").len(), 1);
    }
}
