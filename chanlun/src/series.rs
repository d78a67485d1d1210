//! 结构序列：除最后一个元素外均为已确认状态，尾部元素可被重算。

use chrono::{DateTime, Utc};

use crate::constant::PointState;

pub trait Timestamped {
    fn dt(&self) -> DateTime<Utc>;
}

/// Records that carry an explicit confirmed/tentative flag.
pub trait Stateful {
    fn set_state(&mut self, state: PointState);
}

#[derive(Debug, Clone)]
pub struct StructureSeries<T> {
    rows: Vec<T>,
}

impl<T> Default for StructureSeries<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: Timestamped + Clone> StructureSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.rows.last()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.rows.get(index)
    }

    pub fn confirmed(&self) -> &[T] {
        let end = self.rows.len().saturating_sub(1);
        &self.rows[..end]
    }

    pub fn tentative(&self) -> Option<&T> {
        self.rows.last()
    }

    pub fn state_of(&self, index: usize) -> Option<PointState> {
        if index >= self.rows.len() {
            None
        } else if index + 1 == self.rows.len() {
            Some(PointState::Tentative)
        } else {
            Some(PointState::Confirmed)
        }
    }

    pub fn last_n(&self, n: usize) -> &[T] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    pub fn push(&mut self, row: T) {
        self.rows.push(row);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.rows.pop()
    }

    pub fn replace_last(&mut self, row: T) {
        match self.rows.last_mut() {
            Some(last) => *last = row,
            None => self.rows.push(row),
        }
    }

    pub fn replace_all(&mut self, rows: Vec<T>) {
        self.rows = rows;
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Drops the last `n` rows and returns them in order.
    pub fn truncate_tail(&mut self, n: usize) -> Vec<T> {
        let start = self.rows.len().saturating_sub(n);
        self.rows.split_off(start)
    }

    /// Index of the first row strictly after `dt`.
    pub fn index_after(&self, dt: DateTime<Utc>) -> usize {
        index_after(&self.rows, dt)
    }

    pub fn index_at_or_after(&self, dt: DateTime<Utc>) -> usize {
        index_at_or_after(&self.rows, dt)
    }

    /// Rows with `start <= dt <= end`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[T] {
        range(&self.rows, start, end)
    }

    /// Keeps only rows strictly after `dt`, returning how many were dropped.
    pub fn retain_after(&mut self, dt: DateTime<Utc>) -> usize {
        let cut = self.index_after(dt);
        self.rows.drain(..cut);
        cut
    }
}

impl<T: Timestamped + Clone + Stateful> StructureSeries<T> {
    pub(crate) fn refresh_states(&mut self) {
        let last = self.rows.len().saturating_sub(1);
        for (idx, row) in self.rows.iter_mut().enumerate() {
            row.set_state(if idx == last {
                PointState::Tentative
            } else {
                PointState::Confirmed
            });
        }
    }
}

pub(crate) fn index_after<T: Timestamped>(rows: &[T], dt: DateTime<Utc>) -> usize {
    rows.partition_point(|row| row.dt() <= dt)
}

pub(crate) fn index_at_or_after<T: Timestamped>(rows: &[T], dt: DateTime<Utc>) -> usize {
    rows.partition_point(|row| row.dt() < dt)
}

pub(crate) fn range<T: Timestamped>(rows: &[T], start: DateTime<Utc>, end: DateTime<Utc>) -> &[T] {
    let lo = index_at_or_after(rows, start);
    let hi = index_after(rows, end).max(lo);
    &rows[lo..hi]
}

/// Number of rows with `after < dt < before`.
pub(crate) fn count_between<T: Timestamped>(
    rows: &[T],
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> usize {
    let lo = index_after(rows, after);
    let hi = index_at_or_after(rows, before);
    hi.saturating_sub(lo)
}
