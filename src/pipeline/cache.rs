use hashbrown::HashMap;

use crate::models::Coordinate;

/// In-memory lookup results keyed by normalized address.
///
/// Holds definitive answers only: a coordinate, or `None` for "no match".
/// Failed calls are never stored.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: HashMap<String, Option<Coordinate>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<Option<Coordinate>> {
        self.entries.get(&normalize_address(address)).copied()
    }

    pub fn insert(&mut self, address: &str, result: Option<Coordinate>) {
        self.entries.insert(normalize_address(address), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trim, collapse whitespace runs and lowercase
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
