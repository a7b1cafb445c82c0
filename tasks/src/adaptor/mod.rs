//! Future adaptors: conjunctions and disjunctions over sequences of
//! futures.

pub mod seq;
pub mod when_all;
pub mod when_any;

pub use seq::FutureSequence;
pub use when_all::{when_all, when_all_iter, WaitAllFuture};
pub use when_any::{when_any, when_any_iter, WaitAnyFuture, WaitAnyResult};
