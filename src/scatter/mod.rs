//! Scatter pipeline: dependent remote reads batched into ordered rounds
//!
//! Every call into the [`MemoryReader`] costs a full round trip, so a naive walk
//! down a pointer chain of depth D costs D trips *per chain*. A
//! [`ScatterPipeline`] instead declares D rounds up front. All reads queued on a
//! round go out together in one [`MemoryReader::read_scatter`] call, and the
//! round's completion callbacks queue the dependent reads (and callbacks) of the
//! next round using the values just read. Resolving N chains of depth D costs D
//! trips, not N * D.
//!
//! ```ignore
//! let mut pipeline = ScatterPipeline::new();
//! let first = pipeline.add_round();
//! let _second = pipeline.add_round();
//!
//! pipeline.round(first).prepare_read::<u64>(list_head);
//! pipeline.round(first).on_completed(move |results, next| {
//!     if let Some(node) = results.try_read::<u64>(list_head) {
//!         next.prepare_read::<[f32; 16]>(node as usize + MATRIX_OFFSET);
//!         next.on_completed(move |results, _| { /* ... */ });
//!     }
//! });
//!
//! pipeline.execute(&reader)?;
//! ```

use crate::platform::{decode_cstring, is_user_address, MemoryReader, PlatformError, ScatterRequest};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

type Callback<'a> = Box<dyn FnOnce(&ScatterResults, &mut ScatterRound<'a>) + 'a>;

/// Handle to a round inside a [`ScatterPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundHandle(usize);

/// One batch of independent reads plus the callbacks that consume them
#[derive(Default)]
pub struct ScatterRound<'a> {
    requests: Vec<ScatterRequest>,
    /// Membership index over `requests`
    queued: HashSet<ScatterRequest>,
    /// Requests rejected before hitting the wire (null or kernel-space address)
    rejected: usize,
    callbacks: Vec<Callback<'a>>,
}

impl<'a> ScatterRound<'a> {
    /// Queue a read of `size` bytes
    ///
    /// Null and non-user-space addresses are dropped here; they simply read back
    /// as unavailable.
    pub fn prepare(&mut self, address: usize, size: usize) {
        if !is_user_address(address) || size == 0 {
            self.rejected += 1;
            return;
        }

        let request = ScatterRequest::new(address, size);
        if self.queued.insert(request) {
            self.requests.push(request);
        }
    }

    /// Queue a typed read at `address`
    pub fn prepare_read<T: bytemuck::Pod>(&mut self, address: usize) {
        self.prepare(address, std::mem::size_of::<T>());
    }

    /// Register a callback to run once every read in this round is materialized
    ///
    /// The second argument is the next round; reads and callbacks queued on it
    /// are dispatched after this round's callbacks have all returned.
    pub fn on_completed<F>(&mut self, callback: F)
    where
        F: FnOnce(&ScatterResults, &mut ScatterRound<'a>) + 'a,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of requests that will go over the wire
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// No request will go over the wire
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn has_work(&self) -> bool {
        !self.requests.is_empty() || !self.callbacks.is_empty()
    }
}

/// Materialized values of one round
#[derive(Debug, Default)]
pub struct ScatterResults {
    values: HashMap<ScatterRequest, Vec<u8>>,
}

impl ScatterResults {
    /// Raw bytes of a request, if it was queued and readable
    pub fn bytes(&self, address: usize, size: usize) -> Option<&[u8]> {
        self.values
            .get(&ScatterRequest::new(address, size))
            .map(Vec::as_slice)
    }

    /// Typed value at `address`, if it was queued with the same type and readable
    pub fn try_read<T: bytemuck::Pod>(&self, address: usize) -> Option<T> {
        self.bytes(address, std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    /// Pointer at `address`, only if it points into user space
    pub fn try_read_pointer(&self, address: usize) -> Option<usize> {
        self.try_read::<u64>(address)
            .map(|p| p as usize)
            .filter(|p| is_user_address(*p))
    }

    /// NUL-terminated string read as a `size`-byte block
    pub fn try_read_string(&self, address: usize, size: usize) -> Option<String> {
        self.bytes(address, size).and_then(|b| decode_cstring(b).ok())
    }

    /// Number of readable entries
    pub fn available(&self) -> usize {
        self.values.len()
    }
}

/// A fixed number of strictly ordered scatter rounds
#[derive(Default)]
pub struct ScatterPipeline<'a> {
    rounds: Vec<ScatterRound<'a>>,
}

impl<'a> ScatterPipeline<'a> {
    /// Pipeline with no rounds
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a round and return its handle
    pub fn add_round(&mut self) -> RoundHandle {
        self.rounds.push(ScatterRound::default());
        RoundHandle(self.rounds.len() - 1)
    }

    /// Access a round to queue reads or callbacks on it
    ///
    /// # Panics
    /// If `handle` came from a different pipeline with more rounds.
    pub fn round(&mut self, handle: RoundHandle) -> &mut ScatterRound<'a> {
        &mut self.rounds[handle.0]
    }

    /// Number of rounds
    pub fn depth(&self) -> usize {
        self.rounds.len()
    }

    /// Drain every round in order, blocking until the last callback has run
    ///
    /// Each round with at least one valid request costs exactly one
    /// `read_scatter` call. A hard I/O failure aborts the remaining rounds and is
    /// returned; unreadable addresses never are.
    pub fn execute<R>(self, reader: &R) -> Result<(), PlatformError>
    where
        R: MemoryReader + ?Sized,
    {
        let depth = self.rounds.len();
        let mut rounds = self.rounds.into_iter();
        let mut current = match rounds.next() {
            Some(round) => round,
            None => return Ok(()),
        };

        for index in 0..depth {
            let mut next = rounds.next().unwrap_or_default();

            if current.has_work() {
                let results = Self::materialize(reader, index, &current)?;

                for callback in current.callbacks.drain(..) {
                    callback(&results, &mut next);
                }
            }

            if index + 1 == depth && next.has_work() {
                warn!(
                    requests = next.len(),
                    "reads queued past the last scatter round were dropped"
                );
            }

            current = next;
        }

        Ok(())
    }

    fn materialize<R>(
        reader: &R,
        index: usize,
        round: &ScatterRound<'_>,
    ) -> Result<ScatterResults, PlatformError>
    where
        R: MemoryReader + ?Sized,
    {
        let mut results = ScatterResults::default();

        if round.requests.is_empty() {
            trace!(round = index, rejected = round.rejected, "scatter round had nothing to read");
            return Ok(results);
        }

        let values = reader.read_scatter(&round.requests).map_err(|e| {
            debug!(round = index, error = %e, "scatter round aborted");
            e
        })?;

        for (request, value) in round.requests.iter().zip(values) {
            if let Some(bytes) = value {
                if bytes.len() == request.size {
                    results.values.insert(*request, bytes);
                }
            }
        }

        trace!(
            round = index,
            requested = round.requests.len(),
            available = results.available(),
            rejected = round.rejected,
            "scatter round complete"
        );

        Ok(results)
    }
}
