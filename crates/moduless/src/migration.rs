//! Edit scripts between two ordered lists.
//!
//! [`reconcile`] answers "which indexes do I remove, and what do I insert where,
//! to turn `current` into `desired`", preferring to leave items where they are.
//! Equal values are told apart by how many equal values precede them, so
//! `[a, a]` against `[a]` keeps the first `a` and removes the second.
//!
//! Deletion indexes refer to `current` and are strictly descending; insertion
//! indexes are final positions in `desired` and are strictly ascending. Applying
//! every deletion, then every insertion, in the given order yields `desired`.

/// One insertion of an edit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion<T> {
    /// Final position of the item
    pub index: usize,
    /// Item to insert
    pub item: T,
}

/// Edit script produced by [`reconcile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSteps<T> {
    /// Indexes into the current list, greatest first
    pub indexes_to_delete: Vec<usize>,
    /// Insertions, lowest final index first
    pub items_to_add: Vec<Insertion<T>>,
}

impl<T> Default for MigrationSteps<T> {
    fn default() -> Self {
        Self {
            indexes_to_delete: Vec::new(),
            items_to_add: Vec::new(),
        }
    }
}

impl<T: Clone> MigrationSteps<T> {
    /// Whether the lists were already equal
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes_to_delete.is_empty() && self.items_to_add.is_empty()
    }

    /// Apply deletions then insertions to a list in place
    pub fn apply(&self, list: &mut Vec<T>) {
        for &index in &self.indexes_to_delete {
            list.remove(index);
        }
        for insertion in &self.items_to_add {
            list.insert(insertion.index, insertion.item.clone());
        }
    }
}

/// Compute the edit script that turns `current` into `desired`
pub fn reconcile<T: PartialEq + Clone>(current: &[T], desired: &[T]) -> MigrationSteps<T> {
    if std::ptr::eq(current, desired) || current == desired {
        return MigrationSteps::default();
    }

    if current.is_empty() {
        return insert_range(desired, 0);
    }
    if desired.is_empty() {
        return delete_range(0, current.len());
    }

    let prefix = current
        .iter()
        .zip(desired)
        .take_while(|(a, b)| a == b)
        .count();
    if prefix == current.len() {
        return insert_range(desired, prefix);
    }
    if prefix == desired.len() {
        return delete_range(prefix, current.len());
    }

    // Destination of every current item whose (value, ordinal) survives
    let destinations: Vec<Option<usize>> = current
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let nth = occurrence(current, index);
            nth_position(desired, item, nth)
        })
        .collect();

    if destinations.iter().all(Option::is_none) {
        let mut steps = delete_range(0, current.len());
        steps.items_to_add = insert_range(desired, 0).items_to_add;
        return steps;
    }

    let survivors: Vec<(usize, usize)> = destinations
        .iter()
        .enumerate()
        .filter_map(|(index, dst)| dst.map(|dst| (index, dst)))
        .collect();
    let (start, len) = longest_advancing_run(&survivors);

    let mut keep = vec![false; current.len()];
    let mut placed = vec![false; desired.len()];
    for &(index, dst) in &survivors[start..start + len] {
        keep[index] = true;
        placed[dst] = true;
    }

    MigrationSteps {
        indexes_to_delete: (0..current.len()).rev().filter(|i| !keep[*i]).collect(),
        items_to_add: (0..desired.len())
            .filter(|i| !placed[*i])
            .map(|index| Insertion {
                index,
                item: desired[index].clone(),
            })
            .collect(),
    }
}

fn insert_range<T: Clone>(desired: &[T], from: usize) -> MigrationSteps<T> {
    MigrationSteps {
        indexes_to_delete: Vec::new(),
        items_to_add: desired
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, item)| Insertion {
                index,
                item: item.clone(),
            })
            .collect(),
    }
}

fn delete_range<T>(from: usize, to: usize) -> MigrationSteps<T> {
    MigrationSteps {
        indexes_to_delete: (from..to).rev().collect(),
        items_to_add: Vec::new(),
    }
}

/// How many items equal to `list[index]` precede it
fn occurrence<T: PartialEq>(list: &[T], index: usize) -> usize {
    list[..index].iter().filter(|x| **x == list[index]).count()
}

/// Position of the `nth` (0-based) item equal to `item`
fn nth_position<T: PartialEq>(list: &[T], item: &T, nth: usize) -> Option<usize> {
    list.iter()
        .enumerate()
        .filter(|(_, x)| *x == item)
        .nth(nth)
        .map(|(index, _)| index)
}

/// Leftmost longest run of survivors whose destinations strictly increase.
/// Returns `(start, len)` into `survivors`, which must be non-empty.
fn longest_advancing_run(survivors: &[(usize, usize)]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut run_start = 0;
    for i in 1..survivors.len() {
        if survivors[i].1 <= survivors[i - 1].1 {
            run_start = i;
        }
        let len = i - run_start + 1;
        if len > best.1 {
            best = (run_start, len);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn migrate<T: PartialEq + Clone + std::fmt::Debug>(current: &[T], desired: &[T]) -> MigrationSteps<T> {
        let steps = reconcile(current, desired);
        let mut list = current.to_vec();
        steps.apply(&mut list);
        assert_eq!(list, desired, "steps {steps:?} do not migrate");
        steps
    }

    mod known_case_tests {
        use super::*;

        #[test]
        fn test_equal_lists() {
            assert!(migrate(&["a", "b"], &["a", "b"]).is_empty());
            assert!(migrate::<&str>(&[], &[]).is_empty());
        }

        #[test]
        fn test_append() {
            let steps = migrate(&["a", "b", "c"], &["a", "b", "c", "d"]);
            assert!(steps.indexes_to_delete.is_empty());
            assert_eq!(steps.items_to_add, vec![Insertion { index: 3, item: "d" }]);
        }

        #[test]
        fn test_remove_middle() {
            let steps = migrate(&["a", "b", "c"], &["a", "c"]);
            assert_eq!(steps.indexes_to_delete, vec![1]);
            assert!(steps.items_to_add.is_empty());
        }

        #[test]
        fn test_swap_is_one_move() {
            let steps = migrate(&["a", "b"], &["b", "a"]);
            assert_eq!(steps.indexes_to_delete.len(), 1);
            assert_eq!(steps.items_to_add.len(), 1);
        }

        #[test]
        fn test_truncate() {
            let steps = migrate(&["a", "b", "c", "d"], &["a", "b"]);
            assert_eq!(steps.indexes_to_delete, vec![3, 2]);
        }

        #[test]
        fn test_from_empty() {
            let steps = migrate(&[], &["x", "y"]);
            assert_eq!(steps.items_to_add.len(), 2);
            assert_eq!(steps.items_to_add[1], Insertion { index: 1, item: "y" });
        }

        #[test]
        fn test_to_empty() {
            let steps = migrate(&["x", "y", "z"], &[]);
            assert_eq!(steps.indexes_to_delete, vec![2, 1, 0]);
        }

        #[test]
        fn test_nothing_in_common() {
            let steps = migrate(&["a", "b"], &["c", "d", "e"]);
            assert_eq!(steps.indexes_to_delete, vec![1, 0]);
            assert_eq!(steps.items_to_add.len(), 3);
        }

        #[test]
        fn test_move_to_front_keeps_the_rest() {
            let steps = migrate(&["a", "b", "c", "d"], &["d", "a", "b", "c"]);
            assert_eq!(steps.indexes_to_delete, vec![3]);
            assert_eq!(steps.items_to_add, vec![Insertion { index: 0, item: "d" }]);
        }

        #[test]
        fn test_duplicates_by_ordinal() {
            let steps = migrate(&["a", "a", "b"], &["a", "b"]);
            assert_eq!(steps.indexes_to_delete, vec![1]);
            assert!(steps.items_to_add.is_empty());
        }

        #[test]
        fn test_replace_one() {
            let steps = migrate(&["a", "x", "c"], &["a", "y", "c"]);
            assert_eq!(steps.indexes_to_delete, vec![1]);
            assert_eq!(steps.items_to_add, vec![Insertion { index: 1, item: "y" }]);
        }

        #[test]
        fn test_deleted_names_come_from_current() {
            let current = ["coverA", "coverB", "coverC"];
            let desired = ["coverC", "coverD"];
            let steps = migrate(&current, &desired);
            let removed: Vec<_> = steps.indexes_to_delete.iter().map(|i| current[*i]).collect();
            assert_eq!(removed, vec!["coverB", "coverA"]);
            for insertion in &steps.items_to_add {
                assert_eq!(insertion.item, desired[insertion.index]);
            }
        }
    }

    fn small_list() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..6, 0..10)
    }

    proptest! {
        #[test]
        fn prop_steps_migrate(current in small_list(), desired in small_list()) {
            migrate(&current, &desired);
        }

        #[test]
        fn prop_deletes_descend_and_adds_ascend(current in small_list(), desired in small_list()) {
            let steps = reconcile(&current, &desired);
            prop_assert!(steps.indexes_to_delete.windows(2).all(|w| w[0] > w[1]));
            prop_assert!(steps.items_to_add.windows(2).all(|w| w[0].index < w[1].index));
            prop_assert!(steps.indexes_to_delete.iter().all(|i| *i < current.len()));
            for insertion in &steps.items_to_add {
                prop_assert_eq!(insertion.item, desired[insertion.index]);
            }
        }

        #[test]
        fn prop_equal_lists_need_nothing(list in small_list()) {
            prop_assert!(reconcile(&list, &list.clone()).is_empty());
        }
    }
}
