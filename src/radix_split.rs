//! Radix split (RS, design spec §4.6): partitions one bucket into `2^b`
//! children by the top `b` bits of the adapter's monotone hash, so each
//! child can be internally sorted (or split again) independently. Unlike
//! [`crate::external_merge`], RS does not need its records in any
//! particular order — it is purely a hash-bucketing pass.
//!
//! Children are opened for write lazily, one `store.open_write` call per
//! record, rather than all `2^b` kept open for the whole pass: `b` can be
//! large enough that holding every child open at once would blow the
//! store's file-descriptor budget, and [`crate::bucket::BucketStore`]'s
//! swap-out/reopen discipline already makes repeated `open_write` calls
//! on the same id cheap when it's still resident.

use crate::adapter::SortAdapter;
use crate::bucket::{Bucket, BucketId, BucketStore};
use crate::error::SortResult;

pub struct SplitOutcome {
    /// One entry per child, in hash-bucket-index order.
    pub children: Vec<BucketId>,
    /// Records routed to each child, parallel to `children`.
    pub records_per_child: Vec<u64>,
}

/// Splits every record in `src` (already open for read, checked out of
/// `store` so both can be borrowed at once) across `2^b` new buckets in
/// `store`, where `b = bits.clamp(1, parent_hash_bits)`. Each child's
/// `hash_bits_remaining` is `parent_hash_bits - b`.
pub fn radix_split<K, A>(
    adapter: &A,
    src: &mut Bucket,
    store: &mut BucketStore,
    bits: u32,
    parent_hash_bits: u32,
) -> SortResult<SplitOutcome>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    let bits = bits.min(parent_hash_bits.max(1)).max(1);
    let shift = parent_hash_bits.saturating_sub(bits);
    let mask = (1u64 << bits) - 1;
    let num_children = 1usize << bits;

    let children: Vec<BucketId> = (0..num_children).map(|_| store.new_bucket(shift)).collect();
    let mut records_per_child = vec![0u64; num_children];

    loop {
        let Some(key) = adapter.read_key(src)? else {
            break;
        };
        let hash = adapter
            .hash(&key)
            .expect("radix_split requires an adapter whose hash() is always Some");
        let bucket_idx = ((hash >> shift) & mask) as usize;
        let tail = adapter
            .fetch_record(src, &key, usize::MAX)?
            .expect("fetch_record with usize::MAX limit must always succeed");

        let child = store.open_write(children[bucket_idx])?;
        adapter.store_record(child, &key, &tail)?;
        records_per_child[bucket_idx] += 1;
    }

    Ok(SplitOutcome {
        children,
        records_per_child,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct HashedAdapter;

    impl SortAdapter<u32> for HashedAdapter {
        fn read_key(&self, src: &mut dyn crate::stream::Stream) -> SortResult<Option<u32>> {
            use std::io::Read;
            let mut buf = [0u8; 4];
            match src.read_exact(&mut buf) {
                Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn write_record(
            &self,
            _src: &mut dyn crate::stream::Stream,
            dst: &mut dyn crate::stream::Stream,
            key: &u32,
        ) -> SortResult<()> {
            dst.write_all(&key.to_le_bytes())?;
            Ok(())
        }

        fn fetch_record(
            &self,
            _src: &mut dyn crate::stream::Stream,
            _key: &u32,
            _limit: usize,
        ) -> SortResult<Option<Vec<u8>>> {
            Ok(Some(Vec::new()))
        }

        fn store_record(&self, dst: &mut dyn crate::stream::Stream, key: &u32, _tail: &[u8]) -> SortResult<()> {
            dst.write_all(&key.to_le_bytes())?;
            Ok(())
        }

        fn hash(&self, key: &u32) -> Option<u64> {
            Some(*key as u64)
        }

        fn hash_bits(&self) -> u32 {
            16
        }
    }

    #[test]
    fn splits_records_by_top_hash_bits() {
        let adapter = HashedAdapter;
        let dir = tempfile::tempdir().unwrap();
        let mut store = BucketStore::new(Some(dir.path().to_path_buf()), 4096, 16);
        let src_id = store.new_bucket(16);
        {
            let src = store.open_write(src_id).unwrap();
            for v in [0u32, 1, 0x4000, 0x8000, 0xC000, 3] {
                src.write_all(&v.to_le_bytes()).unwrap();
            }
        }
        store.open_read(src_id).unwrap();
        let mut checked_out = store.checkout_many(&[src_id]);
        let mut src = checked_out.pop().unwrap();

        let outcome = radix_split(&adapter, &mut src, &mut store, 2, 16).unwrap();
        assert_eq!(outcome.children.len(), 4);
        assert_eq!(outcome.records_per_child.iter().sum::<u64>(), 6);
        // Values 0,1,3 hash into bucket 0 (top 2 bits zero), 0x4000 into
        // bucket 1, 0x8000 into bucket 2, 0xC000 into bucket 3.
        assert_eq!(outcome.records_per_child, vec![3, 1, 1, 1]);

        store.return_many(&[src_id], vec![src]);
    }
}
