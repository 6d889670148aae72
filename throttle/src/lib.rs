//! Bandwidth throttling for uploads
//!
//! This crate bounds the number of bytes per second read from a local source before they are
//! handed to the object store. It is built from three pieces:
//!
//! 1. **Rate parsing** - [`parse_rate`] turns the user supplied `--max` value (`512`, `100k`,
//!    `2M`, or empty for the default) into bytes per second
//! 2. **Token bucket** - [`Limiter`] accrues tokens continuously at the configured rate up to a
//!    fixed burst capacity and tells the caller exactly how long to wait for a deficit
//! 3. **Throttled reader** - [`ThrottledReader`] wraps any [`tokio::io::AsyncRead`] and charges
//!    every read against a borrowed [`Limiter`]
//!
//! # Guarantee
//!
//! For a limiter with rate `R` and burst `B`, the bytes delivered over any interval of length
//! `T` never exceed `R * T + B`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use throttle::{Limiter, ThrottledReader, parse_rate, DEFAULT_BURST};
//! use tokio::io::AsyncReadExt;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rate = parse_rate("100k")?;
//! let mut limiter = Limiter::with_rate(rate, DEFAULT_BURST);
//! let file = tokio::fs::File::open("/tmp/data").await?;
//! let mut reader = ThrottledReader::new(file, &mut limiter);
//! let mut contents = Vec::new();
//! reader.read_to_end(&mut contents).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Suspension
//!
//! Waiting for tokens parks only the reading task on a tokio timer; the worker thread stays
//! free for other tasks. The limiter never spins: each wait is computed from the deficit.
//!
//! A limiter is not synchronized. It is meant to be owned by a single consumer and lent to one
//! reader at a time, which the `&mut` borrow in [`ThrottledReader`] enforces.

mod bucket;
mod rate;
mod reader;

pub use bucket::{Clock, Limiter, MonoClock};
pub use rate::{DEFAULT_BURST, DEFAULT_RATE, RateError, parse_rate};
pub use reader::ThrottledReader;
