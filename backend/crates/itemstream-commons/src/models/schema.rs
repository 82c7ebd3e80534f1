use std::collections::BTreeSet;

/// Snapshot of the collections known to the data store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    collections: BTreeSet<String>,
}

impl Schema {
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }
}
