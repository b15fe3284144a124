use std::sync::{Arc, Barrier};

/// The distributed-communicator surface the pipeline needs. Stands in for
/// the MPI communicator the process bootstrap hands over.
pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Blocks until every rank in the group has arrived.
    fn barrier(&self);
}

/// An SPMD worker group sharing one process: one OS thread per rank,
/// synchronized through a shared barrier.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
}

impl ThreadComm {
    /// Creates the per-rank handles for a group of `size` workers.
    pub fn split(size: usize) -> Vec<ThreadComm> {
        let barrier = Arc::new(Barrier::new(size));
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}
