use crate::error::CropScanError;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

/// Bounded pool used to fan out the images of one batch.
///
/// Results come back indexed by input position, no shared accumulator is involved.
#[derive(Debug)]
pub struct BatchPool {
    pool: ThreadPool,
}

impl BatchPool {
    pub fn new(workers: usize) -> Result<Self, CropScanError> {
        if workers == 0 {
            return Err(CropScanError::InvalidConfig(
                "batch worker count must be at least 1".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("batch-worker-{idx}"))
            .build()
            .map_err(|e| CropScanError::WorkerPoolError(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn map_ordered<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Send + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(idx, item)| f(idx, item))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn preserves_input_order_under_uneven_work() {
        let pool = BatchPool::new(4).unwrap();
        let delays: Vec<u64> = vec![30, 1, 20, 0, 10, 5];
        let out = pool.map_ordered(&delays, |idx, delay| {
            std::thread::sleep(Duration::from_millis(*delay));
            idx * 10
        });
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        assert!(matches!(
            BatchPool::new(0),
            Err(CropScanError::InvalidConfig(_))
        ));
    }
}
