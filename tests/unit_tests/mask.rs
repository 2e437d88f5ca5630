use cutfem::mask::{DofMask, ElementSet};
use proptest::collection::vec;
use proptest::prelude::*;

#[test]
fn set_operations() {
    let a = ElementSet::from_indices(6, [0, 1, 4]);
    let b = ElementSet::from_indices(6, [1, 2, 4]);
    assert_eq!((&a & &b).indices(), vec![1, 4]);
    assert_eq!((&a | &b).indices(), vec![0, 1, 2, 4]);
    assert_eq!(a.difference(&b).indices(), vec![0]);
    assert_eq!((!&a).indices(), vec![2, 3, 5]);
    assert_eq!(a.count(), 3);
    assert_eq!(a.len(), 6);
    assert!(a.contains(4));
    assert!(!a.contains(5));
    // Out-of-range queries are simply not members
    assert!(!a.contains(100));
}

#[test]
fn insert_and_remove() {
    let mut mask = DofMask::new(4);
    assert_eq!(mask.count(), 0);
    mask.insert(2);
    mask.insert(2);
    mask.insert(0);
    assert_eq!(mask.indices(), vec![0, 2]);
    mask.remove(2);
    assert_eq!(mask.indices(), vec![0]);
    assert_eq!(DofMask::full(3).count(), 3);
    assert_eq!(DofMask::from_fn(5, |i| i % 2 == 1).indices(), vec![1, 3]);
}

#[test]
fn concatenation_offsets_later_blocks() {
    let first = DofMask::from_indices(3, [0, 2]);
    let second = DofMask::from_indices(2, [1]);
    let stacked = DofMask::concatenate([&first, &second]);
    assert_eq!(stacked.len(), 5);
    assert_eq!(stacked.indices(), vec![0, 2, 4]);
}

#[test]
#[should_panic]
fn combining_masks_of_different_lengths_panics() {
    let a = ElementSet::new(3);
    let b = ElementSet::new(4);
    let _ = &a & &b;
}

#[test]
fn masks_serialize_as_plain_booleans() {
    let mask = ElementSet::from_indices(3, [1]);
    let json = serde_json::to_string(&mask).unwrap();
    assert_eq!(json, r#"{"mask":[false,true,false]}"#);
    let parsed: ElementSet = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, mask);
}

proptest! {
    #[test]
    fn intersection_is_subset_of_both(members in vec((any::<bool>(), any::<bool>()), 0..50)) {
        let a = DofMask::from_vec(members.iter().map(|(a, _)| *a).collect());
        let b = DofMask::from_vec(members.iter().map(|(_, b)| *b).collect());
        let both = &a & &b;
        let either = &a | &b;
        prop_assert!(both.is_subset_of(&a));
        prop_assert!(both.is_subset_of(&b));
        prop_assert!(a.is_subset_of(&either));
        prop_assert_eq!(both.count() + either.count(), a.count() + b.count());
        prop_assert_eq!(!&(!&a), a);
    }
}
