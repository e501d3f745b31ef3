//! Replica group communication
//!
//! Hook state never crosses replicas: every hook transition is a function of
//! the shared iteration counter. The only value that must be distributed is
//! the dataset statistics, computed by rank 0 and broadcast before the first
//! iteration.

use crate::data::ClassStatistics;
use crate::{Error, Result};
use std::sync::{Arc, Barrier, Mutex};

const NAME: &str = "communicator";

/// A member of a replica group
///
/// Every collective call must be made by all ranks in the same order.
pub trait Communicator: Send {
    /// Rank of this replica
    fn rank(&self) -> usize;

    /// Number of replicas
    fn world_size(&self) -> usize;

    /// Whether this replica is rank 0
    fn is_main(&self) -> bool {
        self.rank() == 0
    }

    /// Broadcast bytes from rank 0 to every rank
    ///
    /// Rank 0 passes `Some(payload)`; other ranks pass `None` and receive a
    /// copy. If rank 0 passes `None` every rank gets an error.
    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>>;
}

/// Single-replica group
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        payload.ok_or_else(|| Error::state(NAME, "rank 0 broadcast without a payload"))
    }
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Option<Vec<u8>>>,
    barrier: Barrier,
    world_size: usize,
}

/// In-process replica group, one handle per replica thread
#[derive(Clone, Debug)]
pub struct ThreadGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadGroup {
    /// Create handles for ranks `0..world_size`
    pub fn new(world_size: usize) -> Result<Vec<ThreadGroup>> {
        if world_size == 0 {
            return Err(Error::config(NAME, "world size must be at least 1"));
        }
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            barrier: Barrier::new(world_size),
            world_size,
        });
        Ok((0..world_size).map(|rank| ThreadGroup { rank, shared: Arc::clone(&shared) }).collect())
    }
}

impl Communicator for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let poisoned = || Error::state(NAME, "broadcast slot poisoned by a panicking replica");

        if self.rank == 0 {
            *self.shared.slot.lock().map_err(|_| poisoned())? = payload;
        }
        self.shared.barrier.wait();
        let received = self.shared.slot.lock().map_err(|_| poisoned())?.clone();
        // Root may not overwrite the slot until every rank has read it
        self.shared.barrier.wait();

        received.ok_or_else(|| Error::state(NAME, format!("rank {}: root sent no payload", self.rank)))
    }
}

/// Compute statistics on rank 0 and hand the same values to every rank
///
/// `collect` runs on rank 0 only. Every rank, rank 0 included, decodes the
/// broadcast bytes, so all replicas hold bit-identical statistics. A failure
/// on rank 0 is reported on every rank.
pub fn share_class_statistics<F>(comm: &dyn Communicator, collect: F) -> Result<ClassStatistics>
where
    F: FnOnce() -> Result<ClassStatistics>,
{
    if !comm.is_main() {
        let bytes = comm.broadcast(None)?;
        return Ok(serde_json::from_slice(&bytes)?);
    }

    match collect().and_then(|stats| Ok(serde_json::to_vec(&stats)?)) {
        Ok(bytes) => {
            let bytes = comm.broadcast(Some(bytes))?;
            tracing::debug!(world_size = comm.world_size(), bytes = bytes.len(), "class statistics broadcast");
            Ok(serde_json::from_slice(&bytes)?)
        }
        Err(e) => {
            // Release the other ranks before reporting
            if let Err(release) = comm.broadcast(None) {
                tracing::debug!(error = %release, "waiting ranks released without statistics");
            }
            Err(e)
        }
    }
}
