use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use karstdb::common::types::Rid;
use karstdb::index::btree::BPlusTree;

mod common;
use common::create_test_buffer_pool;

fn rid_for(key: i64) -> Rid {
    Rid::new(1, key as u32)
}

#[test]
fn test_single_leaf_insert_and_get() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(50)?;
    let tree = BPlusTree::<i64>::new("single_leaf", buffer_pool)?;
    assert!(tree.is_empty());

    for key in [5i64, 3, 8, 2, 7] {
        assert!(tree.insert(key, rid_for(key))?);
    }
    assert!(!tree.is_empty());

    for key in [5i64, 3, 8, 2, 7] {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    assert_eq!(tree.get_value(&100)?, None);
    Ok(())
}

#[test]
fn test_duplicate_keys_rejected() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(50)?;
    let tree = BPlusTree::<i64>::new("dups", buffer_pool)?;

    assert!(tree.insert(9, rid_for(9))?);
    assert!(!tree.insert(9, Rid::new(2, 2))?);
    assert_eq!(tree.get_value(&9)?, Some(rid_for(9)));
    Ok(())
}

#[test]
fn test_leaf_split_shape() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(50)?;
    let tree = BPlusTree::<i64>::with_max_sizes("split_shape", buffer_pool, 3, 3)?;

    for key in [5i64, 10, 15, 20] {
        assert!(tree.insert(key, rid_for(key))?);
    }

    // the leaf split in half and the chain stays sorted
    let entries: Vec<(i64, Rid)> = tree.iter()?.collect();
    assert_eq!(
        entries,
        vec![
            (5, rid_for(5)),
            (10, rid_for(10)),
            (15, rid_for(15)),
            (20, rid_for(20)),
        ]
    );

    // removal below min triggers a merge; order is preserved
    tree.remove(&10)?;
    let keys: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    assert_eq!(keys, vec![5, 15, 20]);
    for key in [5i64, 15, 20] {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    assert_eq!(tree.get_value(&10)?, None);
    Ok(())
}

#[test]
fn test_random_inserts_iterate_sorted() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(200)?;
    let tree = BPlusTree::<i64>::with_max_sizes("random_inserts", buffer_pool, 4, 4)?;

    let mut keys: Vec<i64> = (0..300).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    keys.shuffle(&mut rng);

    for &key in &keys {
        assert!(tree.insert(key, rid_for(key))?);
    }

    let collected: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    let expected: Vec<i64> = (0..300).collect();
    assert_eq!(collected, expected);

    for &key in &keys {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

#[test]
fn test_interleaved_remove_and_insert() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(200)?;
    let tree = BPlusTree::<i64>::with_max_sizes("churn", buffer_pool, 4, 4)?;

    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let mut keys: Vec<i64> = (0..200).collect();
    keys.shuffle(&mut rng);
    for &key in &keys {
        tree.insert(key, rid_for(key))?;
    }

    // drop the odd keys in random order
    let mut to_remove: Vec<i64> = (0..200).filter(|k| k % 2 == 1).collect();
    to_remove.shuffle(&mut rng);
    for key in &to_remove {
        tree.remove(key)?;
    }

    let remaining: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    let expected: Vec<i64> = (0..200).filter(|k| k % 2 == 0).collect();
    assert_eq!(remaining, expected);

    // put some back, pull others out
    for key in (1..100).step_by(2) {
        tree.insert(key, rid_for(key))?;
    }
    for key in (0..100).step_by(4) {
        tree.remove(&key)?;
    }

    let survivors: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    let expected: Vec<i64> = (0..200)
        .filter(|k| {
            if *k < 100 {
                k % 4 != 0
            } else {
                k % 2 == 0
            }
        })
        .collect();
    assert_eq!(survivors, expected);
    Ok(())
}

#[test]
fn test_remove_everything_empties_tree() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(100)?;
    let tree = BPlusTree::<i64>::with_max_sizes("drain", buffer_pool, 3, 3)?;

    for key in 0i64..60 {
        tree.insert(key, rid_for(key))?;
    }
    for key in 0i64..60 {
        tree.remove(&key)?;
    }

    assert!(tree.is_empty());
    assert_eq!(tree.iter()?.count(), 0);
    assert_eq!(tree.get_value(&30)?, None);

    // the tree grows again after being drained
    tree.insert(42, rid_for(42))?;
    assert_eq!(tree.get_value(&42)?, Some(rid_for(42)));
    Ok(())
}

#[test]
fn test_iter_from_positions_at_key() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(100)?;
    let tree = BPlusTree::<i64>::with_max_sizes("seek", buffer_pool, 4, 4)?;

    for key in (0i64..100).step_by(2) {
        tree.insert(key, rid_for(key))?;
    }

    // exact hit
    let from_forty: Vec<i64> = tree.iter_from(&40)?.map(|(k, _)| k).collect();
    assert_eq!(from_forty.first(), Some(&40));
    assert_eq!(from_forty.len(), 30);

    // between keys: starts at the next larger one
    let from_41: Vec<i64> = tree.iter_from(&41)?.map(|(k, _)| k).collect();
    assert_eq!(from_41.first(), Some(&42));

    // past the end: empty
    assert_eq!(tree.iter_from(&1000)?.count(), 0);
    Ok(())
}

#[test]
fn test_root_persisted_in_header_page() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(100)?;

    {
        let tree = BPlusTree::<i64>::with_max_sizes("persistent", buffer_pool.clone(), 4, 4)?;
        for key in 0i64..50 {
            tree.insert(key, rid_for(key))?;
        }
    }

    // a fresh handle with the same name picks up the stored root
    let reopened = BPlusTree::<i64>::with_max_sizes("persistent", buffer_pool, 4, 4)?;
    assert!(!reopened.is_empty());
    for key in 0i64..50 {
        assert_eq!(reopened.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

#[test]
fn test_two_indexes_share_header_page() -> Result<()> {
    let (buffer_pool, _disk, _file) = create_test_buffer_pool(100)?;

    let first = BPlusTree::<i64>::with_max_sizes("first_idx", buffer_pool.clone(), 4, 4)?;
    let second = BPlusTree::<i64>::with_max_sizes("second_idx", buffer_pool, 4, 4)?;

    for key in 0i64..40 {
        first.insert(key, rid_for(key))?;
        second.insert(key, Rid::new(9, key as u32))?;
    }

    assert_eq!(first.get_value(&17)?, Some(rid_for(17)));
    assert_eq!(second.get_value(&17)?, Some(Rid::new(9, 17)));
    Ok(())
}
