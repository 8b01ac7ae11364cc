use std::collections::{BTreeSet, HashMap};

pub trait Keyframe {
    fn frame_index(&self) -> u32;
}

/// Frames of one channel keyed by frame number. Only registered frames are user-authored.
#[derive(Debug, Clone)]
pub struct MotionTrack<K> {
    id: i32,
    pub name: String,
    keyframes: HashMap<u32, K>,
    registered_indexes: BTreeSet<u32>,
}

impl<K> Default for MotionTrack<K> {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            keyframes: HashMap::new(),
            registered_indexes: BTreeSet::new(),
        }
    }
}

impl<K: Keyframe> MotionTrack<K> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Number of stored frames, interpolated ones included.
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn registered_len(&self) -> usize {
        self.registered_indexes.len()
    }

    pub fn registered_indexes(&self) -> impl Iterator<Item = u32> + '_ {
        self.registered_indexes.iter().copied()
    }

    /// Stores a user-authored frame, replacing any frame at the same number.
    pub fn append(&mut self, keyframe: K) {
        let frame_index = keyframe.frame_index();
        self.keyframes.insert(frame_index, keyframe);
        self.registered_indexes.insert(frame_index);
    }

    /// Stores a sampled frame without registering it. A registered frame at the same number wins.
    pub fn append_interpolated(&mut self, keyframe: K) {
        let frame_index = keyframe.frame_index();
        if !self.registered_indexes.contains(&frame_index) {
            self.keyframes.insert(frame_index, keyframe);
        }
    }

    pub fn get(&self, frame_index: u32) -> Option<&K> {
        self.keyframes.get(&frame_index)
    }

    pub fn get_mut(&mut self, frame_index: u32) -> Option<&mut K> {
        self.keyframes.get_mut(&frame_index)
    }

    pub fn is_registered(&self, frame_index: u32) -> bool {
        self.registered_indexes.contains(&frame_index)
    }

    pub fn remove(&mut self, frame_index: u32) -> Option<K> {
        self.registered_indexes.remove(&frame_index);
        self.keyframes.remove(&frame_index)
    }

    /// Drops every unregistered frame.
    pub fn clear_interpolated(&mut self) {
        let registered = &self.registered_indexes;
        self.keyframes.retain(|index, _| registered.contains(index));
    }

    pub fn clear(&mut self) {
        self.keyframes.clear();
        self.registered_indexes.clear();
    }

    /// Registered frames in ascending frame order.
    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.registered_indexes
            .iter()
            .filter_map(|index| self.keyframes.get(index))
    }

    pub fn max_frame_index(&self) -> Option<u32> {
        self.registered_indexes.iter().next_back().copied()
    }

    pub fn min_frame_index(&self) -> Option<u32> {
        self.registered_indexes.iter().next().copied()
    }

    /// Registered frames around `frame_index`: the last one before it and the next one after it,
    /// the latter clamped to the final frame.
    pub fn search_closest(&self, frame_index: u32) -> (Option<&K>, Option<&K>) {
        let previous = self
            .registered_indexes
            .range(..frame_index)
            .next_back()
            .and_then(|index| self.keyframes.get(index));
        let next = self
            .registered_indexes
            .range(frame_index.saturating_add(1)..)
            .next()
            .or_else(|| self.registered_indexes.iter().next_back())
            .and_then(|index| self.keyframes.get(index));
        (previous, next)
    }

    /// Order used by the VMD writer for bone channels: the maximum frame, then the rest ascending.
    pub fn max_first_order(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.registered_indexes.len());
        if let Some(max) = self.max_frame_index() {
            order.push(max);
            order.extend(self.registered_indexes.iter().copied().filter(|v| *v != max));
        }
        order
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct IdAllocator(i32);

impl IdAllocator {
    pub fn next(&mut self) -> i32 {
        self.0 += 1;
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Named channels of one kind (bones or morphs), kept in first-seen order.
#[derive(Debug, Clone)]
pub struct MotionTrackBundle<K> {
    allocator: IdAllocator,
    tracks: HashMap<String, MotionTrack<K>>,
}

impl<K> Default for MotionTrackBundle<K> {
    fn default() -> Self {
        Self {
            allocator: IdAllocator::default(),
            tracks: HashMap::new(),
        }
    }
}

impl<K: Keyframe> MotionTrackBundle<K> {
    pub fn new() -> MotionTrackBundle<K> {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn registered_len(&self) -> usize {
        self.tracks
            .values()
            .map(|track| track.registered_len())
            .sum()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&MotionTrack<K>> {
        self.tracks.get(name)
    }

    pub fn get_mut_by_name(&mut self, name: &str) -> Option<&mut MotionTrack<K>> {
        self.tracks.get_mut(name)
    }

    pub fn get_by_name_or_new(&mut self, name: &str) -> &mut MotionTrack<K> {
        let allocator = &mut self.allocator;
        self.tracks
            .entry(name.to_owned())
            .or_insert_with(|| MotionTrack {
                id: allocator.next(),
                ..MotionTrack::new(name)
            })
    }

    pub fn resolve_id(&self, id: i32) -> Option<&String> {
        self.tracks
            .values()
            .find(|track| track.id == id)
            .map(|track| &track.name)
    }

    pub fn resolve_name(&self, name: &str) -> Option<i32> {
        self.get_by_name(name).map(|track| track.id)
    }

    pub fn add_keyframe(&mut self, name: &str, keyframe: K) {
        self.get_by_name_or_new(name).append(keyframe);
    }

    pub fn add_interpolated_keyframe(&mut self, name: &str, keyframe: K) {
        self.get_by_name_or_new(name).append_interpolated(keyframe);
    }

    pub fn remove_track(&mut self, name: &str) -> Option<MotionTrack<K>> {
        self.tracks.remove(name)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.allocator.clear();
    }

    /// Channels in the order they were first seen.
    pub fn tracks(&self) -> Vec<&MotionTrack<K>> {
        let mut tracks: Vec<&MotionTrack<K>> = self.tracks.values().collect();
        tracks.sort_by_key(|track| track.id);
        tracks
    }

    pub fn names(&self) -> Vec<&str> {
        self.tracks()
            .into_iter()
            .map(|track| track.name.as_str())
            .collect()
    }

    pub fn max_frame_index(&self) -> Option<u32> {
        self.tracks
            .values()
            .filter_map(|track| track.max_frame_index())
            .max()
    }

    pub fn min_frame_index(&self) -> Option<u32> {
        self.tracks
            .values()
            .filter_map(|track| track.min_frame_index())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Frame(u32, f32);

    impl Keyframe for Frame {
        fn frame_index(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_registered_and_interpolated_frames() {
        let mut track = MotionTrack::new("センター");
        track.append(Frame(10, 1.0));
        track.append(Frame(0, 0.0));
        track.append_interpolated(Frame(5, 0.5));
        track.append_interpolated(Frame(10, 9.0));
        assert_eq!(3, track.len());
        assert_eq!(2, track.registered_len());
        assert_eq!(Some(&Frame(10, 1.0)), track.get(10));
        assert_eq!(
            vec![0, 10],
            track.iter().map(|f| f.0).collect::<Vec<_>>()
        );
        track.clear_interpolated();
        assert!(track.get(5).is_none());
    }

    #[test]
    fn test_search_closest() {
        let mut track = MotionTrack::new("a");
        for index in [0, 10, 30] {
            track.append(Frame(index, index as f32));
        }
        let (prev, next) = track.search_closest(15);
        assert_eq!(Some(10), prev.map(|f| f.0));
        assert_eq!(Some(30), next.map(|f| f.0));
        let (prev, next) = track.search_closest(10);
        assert_eq!(Some(0), prev.map(|f| f.0));
        assert_eq!(Some(30), next.map(|f| f.0));
        let (prev, next) = track.search_closest(40);
        assert_eq!(Some(30), prev.map(|f| f.0));
        assert_eq!(Some(30), next.map(|f| f.0));
        assert_eq!(vec![30, 0, 10], track.max_first_order());
    }

    #[test]
    fn test_bundle_keeps_first_seen_order() {
        let mut bundle = MotionTrackBundle::new();
        bundle.add_keyframe("b", Frame(3, 0.0));
        bundle.add_keyframe("a", Frame(1, 0.0));
        bundle.add_keyframe("b", Frame(7, 0.0));
        bundle.add_interpolated_keyframe("c", Frame(2, 0.0));
        assert_eq!(vec!["b", "a", "c"], bundle.names());
        assert_eq!(3, bundle.registered_len());
        assert_eq!(Some(7), bundle.max_frame_index());
        assert_eq!(Some(1), bundle.min_frame_index());
        assert_eq!(Some(&"a".to_owned()), bundle.resolve_id(2));
        assert_eq!(Some(1), bundle.resolve_name("b"));
    }
}
