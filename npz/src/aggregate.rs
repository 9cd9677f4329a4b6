//! Element-wise reduction of several congruent archives into one.

use std::io::{Read, Seek, Write};

use log::debug;

use crate::{DType, NpyHeader, NpzArchive, NpzError, NpzWriter};

/// The arithmetic mean, used for federated averaging.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Verifies every archive has the keys and shapes of the first one.
///
/// # Errors
/// Returns `NpzError::Empty` for no archives, `NpzError::ShapeMismatch` when
/// keys or shapes differ and `NpzError::LayoutMismatch` when a
/// multi-dimensional array is stored in C order in one archive and Fortran
/// order in another.
pub fn check_congruent<R>(archives: &[NpzArchive<R>]) -> Result<(), NpzError> {
    let (first, rest) = archives.split_first().ok_or(NpzError::Empty)?;

    for other in rest {
        first.check_congruent(other)?;

        for key in first.keys() {
            let (Some(a), Some(b)) = (first.header(key), other.header(key)) else {
                continue;
            };

            if a.shape.len() > 1 && a.fortran_order != b.fortran_order {
                return Err(NpzError::LayoutMismatch {
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Reduces `sources` into `dest`, one element at a time.
///
/// Congruence is checked before anything is written. Each output array
/// takes the element kind and layout of the first source, stored little
/// endian. Arrays are processed in sorted key order, with one reader open per
/// source and a single writer open on the destination.
///
/// # Arguments
/// * `sources` - The archives to reduce, at least one.
/// * `dest` - Where to write the reduced arrays.
/// * `reduce` - Folds the `i`-th element of every source into one value.
///
/// # Errors
/// The congruence errors of `check_congruent`, or any read or write failure.
/// A failure after the first key has been written leaves the earlier keys in
/// `dest`.
pub fn aggregate<R, W, F>(
    sources: &mut [NpzArchive<R>],
    dest: &mut NpzWriter<W>,
    reduce: F,
) -> Result<(), NpzError>
where
    R: Read + Seek,
    W: Write + Seek,
    F: Fn(&[f64]) -> f64,
{
    check_congruent(sources)?;

    let layouts: Vec<(String, NpyHeader)> = sources[0]
        .keys()
        .filter_map(|key| Some((key.to_string(), sources[0].header(key)?.clone())))
        .collect();

    let mut values = Vec::with_capacity(sources.len());

    for (key, first) in layouts {
        let header = NpyHeader {
            dtype: DType::little(first.dtype.kind),
            fortran_order: first.fortran_order,
            shape: first.shape,
        };

        debug!(key = key.as_str(), sources = sources.len(); "aggregating array");

        let mut readers = sources
            .iter_mut()
            .map(|source| source.array_reader(&key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut writer = dest.array_writer(&key, header)?;

        for _ in 0..writer.header().len() {
            values.clear();

            for reader in &mut readers {
                let value = reader.next_value()?.ok_or(NpzError::EndOfArray)?;
                values.push(value);
            }

            writer.write_value(reduce(&values))?;
        }

        writer.finish()?;
    }

    Ok(())
}
