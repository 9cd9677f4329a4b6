use std::{io::Cursor, sync::Arc};

use log::{debug, info};
use npz::{NpzArchive, NpzWriter};
use parking_lot::{Mutex, RwLock};

use crate::AggregateError;

/// The shared state of the aggregation service: the current aggregate and
/// the submissions received since it was produced.
pub struct AggregatorService {
    current: RwLock<Arc<Vec<u8>>>,
    pending: Mutex<Vec<Vec<u8>>>,
    include_current: bool,
}

impl AggregatorService {
    /// Creates a new `AggregatorService`.
    ///
    /// # Arguments
    /// * `initial` - The initial model archive.
    /// * `include_current` - Whether the current aggregate takes part in the
    ///                       next aggregation along with the submissions.
    ///
    /// # Errors
    /// Returns `AggregateError::Archive` if `initial` is not a readable archive.
    pub fn new(initial: Vec<u8>, include_current: bool) -> Result<Self, AggregateError> {
        NpzArchive::new(Cursor::new(initial.as_slice()))?;

        Ok(Self {
            current: RwLock::new(Arc::new(initial)),
            pending: Mutex::new(Vec::new()),
            include_current,
        })
    }

    /// The current aggregate.
    pub fn current(&self) -> Arc<Vec<u8>> {
        self.current.read().clone()
    }

    /// Queues a candidate model for the next aggregation.
    ///
    /// The candidate is read in full and must have the keys, shapes and
    /// memory layout of the current aggregate, a rejected candidate is
    /// never queued.
    ///
    /// # Errors
    /// Returns `AggregateError::Rejected` with the reason.
    pub fn submit(&self, model: Vec<u8>) -> Result<(), AggregateError> {
        let current = self.current();

        let mut pair = [
            NpzArchive::new(Cursor::new(current.as_slice()))?,
            NpzArchive::new(Cursor::new(model.as_slice())).map_err(AggregateError::Rejected)?,
        ];
        npz::check_congruent(&pair).map_err(AggregateError::Rejected)?;
        pair[1].verify().map_err(AggregateError::Rejected)?;
        drop(pair);

        let mut pending = self.pending.lock();
        pending.push(model);
        debug!(pending = pending.len(); "model submitted");
        Ok(())
    }

    /// The amount of submissions waiting for the next aggregation.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Averages every pending submission into a new current aggregate.
    ///
    /// The pending submissions are consumed whether or not the aggregation
    /// succeeds, the current aggregate only changes on success. Submissions
    /// were already validated by `submit`.
    ///
    /// # Returns
    /// The new aggregate.
    ///
    /// # Errors
    /// Returns `AggregateError::NothingToAggregate` if nothing was submitted,
    /// `AggregateError::Archive` if the submissions cannot be reduced and
    /// `AggregateError::Inconsistent` if the result fails validation.
    pub fn aggregate(&self) -> Result<Arc<Vec<u8>>, AggregateError> {
        let models = std::mem::take(&mut *self.pending.lock());
        if models.is_empty() {
            return Err(AggregateError::NothingToAggregate);
        }

        let current = self.include_current.then(|| self.current());

        let mut sources = models
            .iter()
            .map(Vec::as_slice)
            .chain(current.as_deref().map(Vec::as_slice))
            .map(|bytes| NpzArchive::new(Cursor::new(bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut dest = NpzWriter::new(Cursor::new(Vec::new()));
        npz::aggregate(&mut sources, &mut dest, npz::mean)?;
        let output = dest.finish()?.into_inner();

        NpzArchive::new(Cursor::new(output.as_slice()))
            .and_then(|check| sources[0].check_congruent(&check))
            .map_err(AggregateError::Inconsistent)?;

        let output = Arc::new(output);
        *self.current.write() = output.clone();

        info!(sources = sources.len(), bytes = output.len(); "aggregated models");
        Ok(output)
    }
}
