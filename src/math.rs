use std::{collections::BTreeSet, hash::Hash};

/// Type alias for sets, we use this to hide which type of `HashSet` we are actually using.
pub type Set<S> = fxhash::FxHashSet<S>;
/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
pub type Map<K, V> = fxhash::FxHashMap<K, V>;

/// A partition groups elements of type `I` into disjoint classes. Here it is used to
/// represent the equivalence classes that state minimization computes.
#[derive(Debug, Clone)]
pub struct Partition<I: Hash + Eq + Ord>(Vec<BTreeSet<I>>);

impl<I: Hash + Eq + Ord> Partition<I> {
    /// Builds a partition from an iterator of classes, each given as an iterator of elements.
    pub fn new<X: IntoIterator<Item = I>, Y: IntoIterator<Item = X>>(iter: Y) -> Self {
        Self(
            iter.into_iter()
                .map(|class| class.into_iter().collect::<BTreeSet<_>>())
                .collect(),
        )
    }

    /// The number of classes in the partition.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Returns the index of the class that contains `element`, if any.
    pub fn class_of(&self, element: &I) -> Option<usize> {
        self.0.iter().position(|class| class.contains(element))
    }

    /// A partition is discrete if every class is a singleton. A machine whose state
    /// partition is discrete has no mergeable states left.
    pub fn is_discrete(&self) -> bool {
        self.0.iter().all(|class| class.len() == 1)
    }

    /// Iterates over the classes of the partition.
    pub fn iter(&self) -> std::slice::Iter<'_, BTreeSet<I>> {
        self.0.iter()
    }
}

impl<'a, I: Hash + Eq + Ord> IntoIterator for &'a Partition<I> {
    type Item = &'a BTreeSet<I>;
    type IntoIter = std::slice::Iter<'a, BTreeSet<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<I: Hash + Eq + Ord> PartialEq for Partition<I> {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.iter().all(|class| other.0.contains(class))
    }
}
impl<I: Hash + Eq + Ord> Eq for Partition<I> {}

impl<I: Hash + Eq + Ord> From<Vec<BTreeSet<I>>> for Partition<I> {
    fn from(value: Vec<BTreeSet<I>>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Partition;

    #[test]
    fn partition_equality_ignores_class_order() {
        let left = Partition::new([vec![1, 2], vec![3]]);
        let right = Partition::new([vec![3], vec![2, 1]]);
        assert_eq!(left, right);
        assert!(!left.is_discrete());
    }

    #[test]
    fn discrete_partition() {
        let partition = Partition::new([vec![0], vec![1], vec![2]]);
        assert!(partition.is_discrete());
        assert_eq!(partition.size(), 3);
    }
}
