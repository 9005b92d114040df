use std::{
    collections::{hash_map, HashMap},
    hash::Hash,
};

/// Maps a key derived from each row to the rows carrying it.
pub struct Index<K, E> {
    map: HashMap<K, Vec<usize>>,
    get_key: fn(&E) -> K,
}

impl<K, E> Index<K, E>
where
    K: Hash + Eq,
{
    pub fn new(get_key: fn(&E) -> K) -> Self {
        Self {
            map: HashMap::new(),
            get_key,
        }
    }

    pub fn build(get_key: fn(&E) -> K, rows: &[E]) -> Self {
        let mut index = Self::new(get_key);
        index.rebuild(rows);
        index
    }

    /// First row carrying `key`.
    pub fn get(&self, key: &K) -> Option<usize> {
        self.map.get(key).and_then(|rows| rows.first().copied())
    }

    pub fn group(&self, key: &K) -> Option<&Vec<usize>> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn all(&self) -> hash_map::Iter<'_, K, Vec<usize>> {
        self.map.iter()
    }

    pub fn rebuild(&mut self, rows: &[E]) {
        self.map.clear();
        for (row, entry) in rows.iter().enumerate() {
            self.insert(row, entry);
        }
    }

    pub fn insert(&mut self, row: usize, entry: &E) {
        let key = (self.get_key)(entry);
        match self.map.entry(key) {
            hash_map::Entry::Occupied(e) => {
                let rows = e.into_mut();
                if !rows.contains(&row) {
                    rows.push(row);
                }
            }
            hash_map::Entry::Vacant(e) => {
                e.insert(vec![row]);
            }
        }
    }
}
