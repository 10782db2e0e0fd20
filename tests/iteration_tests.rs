//! Tests for value, key, and pair iteration over both forms.

use std::collections::HashSet;

use itertools::Itertools;
use pretty_assertions::assert_eq;
use wirepack::{Error, Packet};

fn sample_object() -> Packet {
    let mut obj = Packet::object();
    obj.insert("hello", "world").unwrap();
    obj.insert("yes", "no").unwrap();
    obj.insert("stop", "go").unwrap();
    obj
}

#[test]
fn object_iteration_is_canonical_in_both_forms() {
    let obj = sample_object();
    let flat = obj.finalize().unwrap();

    for form in &[obj, flat] {
        let keys: Vec<String> = form
            .keys()
            .unwrap()
            .map(|k| k.as_str().unwrap().to_owned())
            .collect();
        // shorter keys first, then bytewise
        assert_eq!(keys, vec!["yes", "stop", "hello"]);

        let values: Vec<String> = form
            .values()
            .unwrap()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect();
        assert_eq!(values, vec!["no", "go", "world"]);
    }
}

#[test]
fn iterators_visit_each_member_exactly_once() {
    let obj = sample_object();
    let flat = obj.finalize().unwrap();

    for form in &[obj, flat] {
        assert_eq!(form.keys().unwrap().len(), 3);
        assert_eq!(form.values().unwrap().len(), 3);

        let seen: HashSet<String> = form
            .keys()
            .unwrap()
            .map(|k| k.as_str().unwrap().to_owned())
            .collect();
        assert_eq!(seen.len(), 3, "each key exactly once");
    }
}

#[test]
fn pair_iteration_matches_keyed_lookup() {
    let obj = sample_object();
    let flat = obj.finalize().unwrap();

    for form in &[obj, flat] {
        let mut pairs = 0;
        for (key, value) in form.entries().unwrap() {
            // the pair iterator is a bijection between keys and values
            assert_eq!(form.get(key.as_str().unwrap()).unwrap(), value);
            pairs += 1;
        }
        assert_eq!(pairs, 3);

        // entries line up pairwise with the two single iterators
        for ((key, value), (k2, v2)) in form
            .entries()
            .unwrap()
            .zip_eq(form.keys().unwrap().zip_eq(form.values().unwrap()))
        {
            assert_eq!(key, k2);
            assert_eq!(value, v2);
        }
    }
}

#[test]
fn array_iteration_preserves_insertion_order() {
    let mut arr = Packet::array();
    arr.push(10).unwrap();
    arr.push(20).unwrap();
    arr.push(30).unwrap();
    let flat = arr.finalize().unwrap();

    for form in &[arr, flat] {
        let elems: Vec<i64> = form
            .values()
            .unwrap()
            .map(|v| v.as_integer().unwrap())
            .collect();
        assert_eq!(elems, vec![10, 20, 30]);
    }
}

#[test]
fn heap_iterators_are_snapshots() {
    let mut obj = sample_object();
    let values = obj.values().unwrap();

    obj.set("hello", "CHANGED").unwrap();
    obj.set("later", "addition").unwrap();

    // the iterator was constructed before the mutations and does not see them
    let seen: Vec<String> = values.map(|v| v.as_str().unwrap().to_owned()).collect();
    assert_eq!(seen, vec!["no", "go", "world"]);

    assert_eq!(obj.size().unwrap(), 4);
}

#[test]
fn iteration_on_the_wrong_kind_is_a_type_error() {
    assert!(matches!(
        Packet::integer(1).values(),
        Err(Error::Type { .. })
    ));
    assert!(matches!(Packet::array().keys(), Err(Error::Type { .. })));
    assert!(matches!(
        Packet::string("s").entries(),
        Err(Error::Type { .. })
    ));
}

#[test]
fn flat_keys_are_zero_copy_views() {
    let flat = sample_object().finalize().unwrap();
    for key in flat.keys().unwrap() {
        // key packets point into the same finalized region
        assert!(key.is_finalized());
        assert!(key.is_string());
    }
}

#[test]
fn empty_aggregate_iteration() {
    assert_eq!(Packet::object().values().unwrap().len(), 0);
    assert_eq!(Packet::array().values().unwrap().len(), 0);
    let flat = Packet::object().finalize().unwrap();
    assert_eq!(flat.entries().unwrap().count(), 0);
}
