use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

slotmap::new_key_type! {
    /// Identity of one composer inside a `Recomposer`.
    pub struct ComposerId;
    /// Identity of one reactive value.
    pub struct StateId;
}

struct StateNode {
    label: Option<&'static str>,
    // composers that read this state during their latest pass
    readers: SmallVec<[ComposerId; 4]>,
}

/// `state -> composers` edges plus the reverse index used to prune a
/// composer's edges when its pass restarts or it is disposed.
#[derive(Default)]
pub struct DependencyGraph {
    states: SlotMap<StateId, StateNode>,
    reads: SecondaryMap<ComposerId, SmallVec<[StateId; 8]>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_state(&mut self, label: Option<&'static str>) -> StateId {
        self.states.insert(StateNode {
            label,
            readers: SmallVec::new(),
        })
    }

    pub fn contains_state(&self, state: StateId) -> bool {
        self.states.contains_key(state)
    }

    pub fn label(&self, state: StateId) -> Option<&'static str> {
        self.states.get(state).and_then(|n| n.label)
    }

    pub fn remove_state(&mut self, state: StateId) {
        let Some(node) = self.states.remove(state) else {
            return;
        };
        for composer in node.readers {
            if let Some(set) = self.reads.get_mut(composer) {
                set.retain(|s| *s != state);
            }
        }
    }

    /// Returns false if the edge already existed or the state is gone.
    pub fn record_read(&mut self, composer: ComposerId, state: StateId) -> bool {
        let Some(node) = self.states.get_mut(state) else {
            return false;
        };
        if node.readers.contains(&composer) {
            return false;
        }
        node.readers.push(composer);
        match self.reads.entry(composer) {
            Some(entry) => entry.or_default().push(state),
            None => log::warn!("record_read from a stale composer id {composer:?}"),
        }
        true
    }

    /// Drops every edge from `composer`. Called at the start of each pass so
    /// the new pass's reads replace the old set rather than merge into it.
    pub fn clear_reads(&mut self, composer: ComposerId) {
        let Some(states) = self.reads.get_mut(composer) else {
            return;
        };
        for state in states.drain(..) {
            if let Some(node) = self.states.get_mut(state) {
                node.readers.retain(|c| *c != composer);
            }
        }
    }

    pub fn remove_composer(&mut self, composer: ComposerId) {
        self.clear_reads(composer);
        self.reads.remove(composer);
    }

    pub fn readers_of(&self, state: StateId) -> Vec<ComposerId> {
        self.states
            .get(state)
            .map(|n| n.readers.to_vec())
            .unwrap_or_default()
    }

    pub fn reads_of(&self, composer: ComposerId) -> Vec<StateId> {
        self.reads
            .get(composer)
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn edge_count(&self) -> usize {
        self.states.values().map(|n| n.readers.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composers(n: usize) -> Vec<ComposerId> {
        let mut ids: SlotMap<ComposerId, ()> = SlotMap::with_key();
        (0..n).map(|_| ids.insert(())).collect()
    }

    #[test]
    fn test_reads_are_deduplicated() {
        let mut g = DependencyGraph::new();
        let c = composers(1)[0];
        let s = g.new_state(Some("count"));
        assert!(g.record_read(c, s));
        assert!(!g.record_read(c, s));
        assert_eq!(g.readers_of(s), vec![c]);
        assert_eq!(g.reads_of(c), vec![s]);
        assert_eq!(g.label(s), Some("count"));
    }

    #[test]
    fn test_clear_reads_prunes_both_directions() {
        let mut g = DependencyGraph::new();
        let ids = composers(2);
        let (a, b) = (ids[0], ids[1]);
        let s = g.new_state(None);
        g.record_read(a, s);
        g.record_read(b, s);

        g.clear_reads(a);
        assert_eq!(g.readers_of(s), vec![b]);
        assert!(g.reads_of(a).is_empty());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_removed_state_drops_edges() {
        let mut g = DependencyGraph::new();
        let c = composers(1)[0];
        let s = g.new_state(None);
        g.record_read(c, s);
        g.remove_state(s);
        assert!(!g.contains_state(s));
        assert!(g.reads_of(c).is_empty());
        assert!(!g.record_read(c, s));
    }
}
