use chrono::{DateTime, Utc};

use crate::series::Timestamped;

/// Index of the first row that differs between two snapshots of a series.
pub(crate) fn first_changed_index<T, FEq>(
    previous: &[T],
    current: &[T],
    equals: FEq,
    append_as_change: bool,
) -> Option<usize>
where
    FEq: Fn(&T, &T) -> bool,
{
    let min_len = previous.len().min(current.len());
    for idx in 0..min_len {
        if !equals(&previous[idx], &current[idx]) {
            return Some(idx);
        }
    }

    if previous.len() > current.len() {
        return Some(min_len);
    }

    if append_as_change && current.len() > previous.len() {
        return Some(min_len);
    }

    None
}

/// Timestamp of the earliest row that differs between two snapshots of the
/// same series. Rows appended to `current` count as a change.
pub(crate) fn first_changed_dt<T, FEq>(previous: &[T], current: &[T], equals: FEq) -> Option<DateTime<Utc>>
where
    T: Timestamped,
    FEq: Fn(&T, &T) -> bool,
{
    let offset = first_changed_index(previous, current, equals, true)?;
    match (previous.get(offset), current.get(offset)) {
        (Some(old), Some(new)) => Some(old.dt().min(new.dt())),
        (Some(old), None) => Some(old.dt()),
        (None, Some(new)) => Some(new.dt()),
        (None, None) => None,
    }
}

pub(crate) fn min_f64<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    values.into_iter().fold(None, |acc, v| match acc {
        Some(current) if current <= v => Some(current),
        _ => Some(v),
    })
}

pub(crate) fn max_f64<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    values.into_iter().fold(None, |acc, v| match acc {
        Some(current) if current >= v => Some(current),
        _ => Some(v),
    })
}
