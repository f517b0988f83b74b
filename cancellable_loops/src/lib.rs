//! # cancellable_loops
//!
//! A small utility crate for mapping over work items in sequential and parallel loops that can be
//! cancelled between items.
//!
//! Each function checks an abort flag before it starts the next item. Items that are already
//! running are never interrupted, so the granularity of cancellation is one item. When the flag
//! is observed the loop returns [`Cancelled`] instead of a partial result.
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::AtomicBool;
//! use cancellable_loops::map_cancellable;
//!
//! let abort_flag = AtomicBool::new(false);
//! let squares = map_cancellable(1..=4, &abort_flag, |i| i * i).unwrap();
//! assert_eq!(squares, vec![1, 4, 9, 16]);
//! ```

use rayon::prelude::*;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Marker returned when a loop stopped because the abort flag was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Maps a function over an iterator sequentially, checking the abort flag before every item.
///
/// # Arguments
///
/// * `iter` - Any iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - A function applied to each element in order
///
/// # Returns
///
/// The mapped values in iteration order, or [`Cancelled`] if the flag was observed.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use cancellable_loops::{map_cancellable, Cancelled};
///
/// let abort_flag = AtomicBool::new(false);
/// let result = map_cancellable(0..10, &abort_flag, |i| {
///     if i == 3 {
///         abort_flag.store(true, Ordering::Relaxed);
///     }
///     i
/// });
///
/// assert_eq!(result, Err(Cancelled));
/// ```
pub fn map_cancellable<I, F, T, R>(iter: I, abort_flag: &AtomicBool, mut func: F) -> Result<Vec<R>, Cancelled>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> R,
{
    let mut output = Vec::new();
    for item in iter {
        if abort_flag.load(Ordering::Relaxed) {
            return Err(Cancelled);
        }
        output.push(func(item));
    }
    Ok(output)
}

/// Maps a function over a parallel iterator using Rayon, skipping the remaining work once the
/// abort flag is set.
///
/// The output keeps the order of the input, independent of the order in which the items finish.
///
/// # Arguments
///
/// * `iter` - Any parallel iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - A function applied to each element
///
/// # Returns
///
/// The mapped values in input order, or [`Cancelled`] if any item was skipped.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::AtomicBool;
/// use cancellable_loops::par_map_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let doubled = par_map_cancellable(vec![1, 2, 3, 4], &abort_flag, |i| 2 * i).unwrap();
///
/// assert_eq!(doubled, vec![2, 4, 6, 8]);
/// ```
pub fn par_map_cancellable<I, F, R>(iter: I, abort_flag: &AtomicBool, func: F) -> Result<Vec<R>, Cancelled>
where
    I: IntoParallelIterator,
    F: Fn(I::Item) -> R + Sync + Send,
    R: Send,
{
    iter.into_par_iter()
        .map(|item| {
            if abort_flag.load(Ordering::Relaxed) {
                None
            } else {
                Some(func(item))
            }
        })
        .collect::<Option<Vec<R>>>()
        .ok_or(Cancelled)
}
