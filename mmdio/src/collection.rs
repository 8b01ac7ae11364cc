use std::collections::HashMap;

use crate::error::{MmdError, Result};

/// An element that knows its own position inside an [`IndexedCollection`].
pub trait IndexModel: Clone {
    fn index(&self) -> i32;
    fn set_index(&mut self, index: i32);
    fn is_valid(&self) -> bool {
        self.index() >= 0
    }
}

/// An element that is also addressable by name inside a [`NamedCollection`].
pub trait NameModel: IndexModel {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
}

/// Position mapping produced by a structural mutation. `-1` marks a slot with no counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReindexResult {
    pub changed: bool,
    pub old_to_new: Vec<i32>,
    pub new_to_old: Vec<i32>,
    pub added: Vec<i32>,
    pub removed: Vec<i32>,
}

impl ReindexResult {
    fn identity(len: usize) -> Self {
        let identity: Vec<i32> = (0..len as i32).collect();
        Self {
            changed: false,
            old_to_new: identity.clone(),
            new_to_old: identity,
            added: vec![],
            removed: vec![],
        }
    }

    /// Maps an index from before the mutation, `-1` when it was removed or out of range.
    pub fn map_old(&self, index: i32) -> i32 {
        if index < 0 {
            return index;
        }
        self.old_to_new.get(index as usize).copied().unwrap_or(-1)
    }
}

#[derive(Debug, Clone)]
pub struct IndexedCollection<T> {
    values: Vec<T>,
    dirty: bool,
}

impl<T> Default for IndexedCollection<T> {
    fn default() -> Self {
        Self {
            values: vec![],
            dirty: false,
        }
    }
}

impl<T: IndexModel> IndexedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn check_range(&self, index: i32) -> Result<usize> {
        if index >= 0 && (index as usize) < self.values.len() {
            Ok(index as usize)
        } else {
            Err(MmdError::IndexOutOfRange {
                index,
                length: self.values.len(),
            })
        }
    }

    pub fn get(&self, index: i32) -> Result<&T> {
        let pos = self.check_range(index)?;
        Ok(&self.values[pos])
    }

    pub fn get_mut(&mut self, index: i32) -> Result<&mut T> {
        let pos = self.check_range(index)?;
        self.dirty = true;
        Ok(&mut self.values[pos])
    }

    /// In range and valid.
    pub fn contains(&self, index: i32) -> bool {
        index >= 0
            && self
                .values
                .get(index as usize)
                .map(|v| v.is_valid())
                .unwrap_or(false)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.dirty = true;
        self.values.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn last(&self) -> Option<&T> {
        self.values.last()
    }

    pub fn append(&mut self, mut value: T) -> ReindexResult {
        let len = self.values.len();
        value.set_index(len as i32);
        self.values.push(value);
        self.dirty = true;
        let mut result = ReindexResult::identity(len);
        result.new_to_old.push(-1);
        result.added.push(len as i32);
        result
    }

    pub fn insert(&mut self, value: T, index: i32) -> Result<ReindexResult> {
        let len = self.values.len();
        if index < 0 || index as usize > len {
            return Err(MmdError::IndexOutOfRange { index, length: len });
        }
        let k = index as usize;
        if k == len {
            return Ok(self.append(value));
        }
        self.values.insert(k, value);
        self.renumber_from(k);
        self.dirty = true;
        let old_to_new = (0..len)
            .map(|i| if i < k { i as i32 } else { i as i32 + 1 })
            .collect();
        let new_to_old = (0..=len)
            .map(|j| match j.cmp(&k) {
                std::cmp::Ordering::Less => j as i32,
                std::cmp::Ordering::Equal => -1,
                std::cmp::Ordering::Greater => j as i32 - 1,
            })
            .collect();
        Ok(ReindexResult {
            changed: true,
            old_to_new,
            new_to_old,
            added: vec![index],
            removed: vec![],
        })
    }

    pub fn remove(&mut self, index: i32) -> Result<(T, ReindexResult)> {
        let pos = self.check_range(index)?;
        let len = self.values.len();
        let removed = self.values.remove(pos);
        self.renumber_from(pos);
        self.dirty = true;
        let old_to_new = (0..len)
            .map(|i| match i.cmp(&pos) {
                std::cmp::Ordering::Less => i as i32,
                std::cmp::Ordering::Equal => -1,
                std::cmp::Ordering::Greater => i as i32 - 1,
            })
            .collect();
        let new_to_old = (0..len)
            .map(|j| {
                if j + 1 >= len {
                    -1
                } else if j < pos {
                    j as i32
                } else {
                    j as i32 + 1
                }
            })
            .collect();
        Ok((
            removed,
            ReindexResult {
                changed: true,
                old_to_new,
                new_to_old,
                added: vec![],
                removed: vec![index],
            },
        ))
    }

    /// Replaces the element at `value.index()`.
    pub fn update(&mut self, value: T) -> Result<ReindexResult> {
        let pos = self.check_range(value.index())?;
        self.values[pos] = value;
        self.dirty = true;
        Ok(ReindexResult::identity(self.values.len()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.dirty = true;
    }

    fn renumber_from(&mut self, start: usize) {
        for (i, value) in self.values.iter_mut().enumerate().skip(start) {
            value.set_index(i as i32);
        }
    }
}

impl<'a, T> IntoIterator for &'a IndexedCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Indexed collection plus a first-wins name index.
#[derive(Debug, Clone)]
pub struct NamedCollection<T> {
    inner: IndexedCollection<T>,
    name_indexes: HashMap<String, i32>,
}

impl<T> Default for NamedCollection<T> {
    fn default() -> Self {
        Self {
            inner: IndexedCollection::default(),
            name_indexes: HashMap::new(),
        }
    }
}

impl<T: NameModel> NamedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: IndexedCollection::with_capacity(capacity),
            name_indexes: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.inner.set_dirty(dirty)
    }

    pub fn get(&self, index: i32) -> Result<&T> {
        self.inner.get(index)
    }

    /// Mutable access. Renames must go through [`NamedCollection::rename`].
    pub fn get_mut(&mut self, index: i32) -> Result<&mut T> {
        self.inner.get_mut(index)
    }

    pub fn contains(&self, index: i32) -> bool {
        self.inner.contains(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }

    /// Renames must go through [`NamedCollection::rename`].
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.inner.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        self.inner.as_slice()
    }

    pub fn get_by_name(&self, name: &str) -> Result<&T> {
        self.find_by_name(name).ok_or_else(|| MmdError::NameNotFound {
            name: name.to_owned(),
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&T> {
        self.name_indexes
            .get(name)
            .and_then(|index| self.inner.get(*index).ok())
    }

    pub fn index_of(&self, name: &str) -> Option<i32> {
        self.name_indexes.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_indexes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.iter().map(|v| v.name())
    }

    pub fn append(&mut self, value: T) -> ReindexResult {
        let name = value.name().to_owned();
        let result = self.inner.append(value);
        let index = self.inner.len() as i32 - 1;
        if self.inner.contains(index) {
            self.name_indexes.entry(name).or_insert(index);
        }
        result
    }

    pub fn insert(&mut self, value: T, index: i32) -> Result<ReindexResult> {
        let result = self.inner.insert(value, index)?;
        self.rebuild();
        Ok(result)
    }

    pub fn remove(&mut self, index: i32) -> Result<(T, ReindexResult)> {
        let removed = self.inner.remove(index)?;
        self.rebuild();
        Ok(removed)
    }

    pub fn update(&mut self, value: T) -> Result<ReindexResult> {
        let existing = self.inner.get(value.index())?;
        if existing.name() != value.name() {
            return Err(MmdError::NameMismatch {
                index: value.index(),
                expected: existing.name().to_owned(),
                actual: value.name().to_owned(),
            });
        }
        self.inner.update(value)
    }

    pub fn rename(&mut self, index: i32, name: &str) -> Result<()> {
        let current = self.inner.get(index)?;
        if current.name() == name {
            return Ok(());
        }
        if let Some(holder) = self.name_indexes.get(name) {
            if *holder != index {
                return Err(MmdError::NameConflict {
                    name: name.to_owned(),
                });
            }
        }
        self.inner.get_mut(index)?.set_name(name.to_owned());
        self.rebuild();
        Ok(())
    }

    /// Recomputes the name index in stored order, keeping the first valid holder of each name.
    pub fn rebuild(&mut self) {
        self.name_indexes.clear();
        for value in self.inner.iter() {
            if value.is_valid() {
                self.name_indexes
                    .entry(value.name().to_owned())
                    .or_insert(value.index());
            }
        }
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.name_indexes.clear();
    }
}

impl<'a, T> IntoIterator for &'a NamedCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        (&self.inner).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        index: i32,
        name: String,
    }

    impl Item {
        fn named(name: &str) -> Self {
            Self {
                index: -1,
                name: name.to_owned(),
            }
        }
    }

    impl IndexModel for Item {
        fn index(&self) -> i32 {
            self.index
        }

        fn set_index(&mut self, index: i32) {
            self.index = index;
        }
    }

    impl NameModel for Item {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_name(&mut self, name: String) {
            self.name = name;
        }
    }

    fn assert_positions(collection: &NamedCollection<Item>) {
        for i in 0..collection.len() as i32 {
            assert_eq!(i, collection.get(i).unwrap().index);
        }
    }

    #[test]
    fn test_append_keeps_existing_indexes() {
        let mut items = NamedCollection::new();
        items.append(Item::named("a"));
        let result = items.append(Item::named("b"));
        assert!(!result.changed);
        assert_eq!(vec![0], result.old_to_new);
        assert_eq!(vec![0, -1], result.new_to_old);
        assert_eq!(vec![1], result.added);
        assert_eq!(1, items.get_by_name("b").unwrap().index);
    }

    #[test]
    fn test_insert_mapping() {
        let mut items = NamedCollection::new();
        for name in ["a", "b", "c", "d"] {
            items.append(Item::named(name));
        }
        let result = items.insert(Item::named("x"), 1).unwrap();
        assert!(result.changed);
        assert_eq!(vec![0, 2, 3, 4], result.old_to_new);
        assert_eq!(vec![0, -1, 1, 2, 3], result.new_to_old);
        assert_eq!(-1, result.new_to_old[1]);
        assert_eq!(1, items.get_by_name("x").unwrap().index);
        assert_eq!(4, items.get_by_name("d").unwrap().index);
        assert_positions(&items);
    }

    #[test]
    fn test_insert_at_len_is_append() {
        let mut items = NamedCollection::new();
        items.append(Item::named("a"));
        let result = items.insert(Item::named("b"), 1).unwrap();
        assert!(!result.changed);
        assert!(matches!(
            items.insert(Item::named("c"), 5),
            Err(MmdError::IndexOutOfRange { index: 5, length: 2 })
        ));
    }

    #[test]
    fn test_remove_mapping() {
        let mut items = NamedCollection::new();
        for name in ["a", "b", "c"] {
            items.append(Item::named(name));
        }
        let (removed, result) = items.remove(0).unwrap();
        assert_eq!("a", removed.name);
        assert_eq!(vec![-1, 0, 1], result.old_to_new);
        assert_eq!(vec![1, 2, -1], result.new_to_old);
        assert_eq!(vec![0], result.removed);
        assert!(items.find_by_name("a").is_none());
        assert_eq!(0, items.get_by_name("b").unwrap().index);
        assert_positions(&items);
    }

    #[test]
    fn test_first_wins_survives_removal() {
        let mut items = NamedCollection::new();
        items.append(Item::named("dup"));
        items.append(Item::named("other"));
        items.append(Item::named("dup"));
        assert_eq!(0, items.get_by_name("dup").unwrap().index);
        items.remove(0).unwrap();
        assert_eq!(1, items.get_by_name("dup").unwrap().index);
        items.insert(Item::named("dup"), 0).unwrap();
        assert_eq!(0, items.get_by_name("dup").unwrap().index);
    }

    #[test]
    fn test_rename_rules() {
        let mut items = NamedCollection::new();
        items.append(Item::named("a"));
        items.append(Item::named("b"));
        assert!(matches!(
            items.rename(0, "b"),
            Err(MmdError::NameConflict { .. })
        ));
        items.rename(0, "a").unwrap();
        items.rename(0, "z").unwrap();
        assert!(items.find_by_name("a").is_none());
        assert_eq!(0, items.get_by_name("z").unwrap().index);
        assert!(matches!(
            items.get_by_name("a"),
            Err(MmdError::NameNotFound { .. })
        ));
    }

    #[test]
    fn test_update_requires_same_name() {
        let mut items = NamedCollection::new();
        items.append(Item::named("a"));
        let mut renamed = items.get(0).unwrap().clone();
        renamed.name = "b".to_owned();
        assert!(matches!(
            items.update(renamed),
            Err(MmdError::NameMismatch { index: 0, .. })
        ));
        let same = items.get(0).unwrap().clone();
        assert!(!items.update(same).unwrap().changed);
    }

    #[test]
    fn test_mixed_sequence_keeps_positions() {
        let mut items = NamedCollection::new();
        for i in 0..10 {
            items.append(Item::named(&format!("n{}", i % 4)));
        }
        items.remove(3).unwrap();
        items.insert(Item::named("n3"), 2).unwrap();
        items.remove(0).unwrap();
        items.insert(Item::named("n0"), 5).unwrap();
        assert_positions(&items);
        for name in ["n0", "n1", "n2", "n3"] {
            let earliest = items.iter().find(|v| v.name == name).unwrap().index;
            assert_eq!(earliest, items.get_by_name(name).unwrap().index);
        }
        assert!(items.is_dirty());
        assert!(!items.contains(-1));
        assert!(!items.contains(items.len() as i32));
    }

    #[test]
    fn test_random_sequences_match_vec_model() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];
        let mut rng = StdRng::seed_from_u64(20240611);
        for _ in 0..8 {
            let mut items = NamedCollection::new();
            let mut expected: Vec<String> = vec![];
            for _ in 0..300 {
                let name = NAMES[rng.gen_range(0..NAMES.len())];
                match rng.gen_range(0..3) {
                    0 => {
                        items.append(Item::named(name));
                        expected.push(name.to_owned());
                    }
                    1 => {
                        let n = expected.len();
                        let k = rng.gen_range(0..=n);
                        let result = items.insert(Item::named(name), k as i32).unwrap();
                        expected.insert(k, name.to_owned());
                        assert_eq!(n, result.old_to_new.len());
                        for (i, mapped) in result.old_to_new.iter().enumerate() {
                            let want = if i < k { i } else { i + 1 };
                            assert_eq!(want as i32, *mapped);
                        }
                        assert_eq!(-1, result.new_to_old[k]);
                    }
                    _ if !expected.is_empty() => {
                        let i = rng.gen_range(0..expected.len());
                        let (removed, _) = items.remove(i as i32).unwrap();
                        assert_eq!(expected.remove(i), removed.name);
                    }
                    _ => {}
                }
                assert_eq!(expected.len(), items.len());
                for (i, name) in expected.iter().enumerate() {
                    let item = items.get(i as i32).unwrap();
                    assert_eq!(i as i32, item.index);
                    assert_eq!(name, &item.name);
                }
                for name in NAMES {
                    let earliest = expected.iter().position(|v| v == name);
                    assert_eq!(
                        earliest.map(|i| i as i32),
                        items.find_by_name(name).map(|v| v.index)
                    );
                }
            }
        }
    }
}
