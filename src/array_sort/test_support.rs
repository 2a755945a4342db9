//! Zero-sized marker adapters shared by every `array_sort` submodule's
//! test suite, so tests construct a real [`SortAdapter`] instead of a bare
//! closure — the one thing array_sort's public API actually takes.

use crate::adapter::SortAdapter;
use crate::error::SortResult;
use crate::stream::Stream;

/// Delegates to `K`'s own `Ord` impl (the adapter default).
pub(crate) struct OrdAdapter;

/// Overrides `compare()` to sort in the opposite order from `K: Ord`, the
/// simplest adapter that can disagree with `K`'s own ordering — the shape
/// `xsort`'s `--reverse` flag needs from a real adapter.
pub(crate) struct RevAdapter;

impl<K> SortAdapter<K> for OrdAdapter
where
    K: Ord + Clone + Send + Sync + 'static,
{
    fn read_key(&self, _src: &mut dyn Stream) -> SortResult<Option<K>> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn write_record(&self, _src: &mut dyn Stream, _dst: &mut dyn Stream, _key: &K) -> SortResult<()> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn fetch_record(&self, _src: &mut dyn Stream, _key: &K, _limit: usize) -> SortResult<Option<Vec<u8>>> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn store_record(&self, _dst: &mut dyn Stream, _key: &K, _tail: &[u8]) -> SortResult<()> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }
}

impl<K> SortAdapter<K> for RevAdapter
where
    K: Ord + Clone + Send + Sync + 'static,
{
    fn compare(&self, a: &K, b: &K) -> std::cmp::Ordering {
        b.cmp(a)
    }

    fn read_key(&self, _src: &mut dyn Stream) -> SortResult<Option<K>> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn write_record(&self, _src: &mut dyn Stream, _dst: &mut dyn Stream, _key: &K) -> SortResult<()> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn fetch_record(&self, _src: &mut dyn Stream, _key: &K, _limit: usize) -> SortResult<Option<Vec<u8>>> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }

    fn store_record(&self, _dst: &mut dyn Stream, _key: &K, _tail: &[u8]) -> SortResult<()> {
        unimplemented!("test adapter: array_sort tests never touch record I/O")
    }
}
