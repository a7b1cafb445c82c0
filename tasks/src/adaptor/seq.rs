//! Uniform view over sequences of futures.
//!
//! Combinators hold their leaves either as a tuple (heterogeneous, fixed
//! arity) or as a `Vec` (homogeneous, dynamic length). This trait gives
//! the combinator machinery one indexed interface over both. Tuple impls
//! are macro-generated up to arity 8.

use std::sync::Arc;
use std::time::Duration;

use crate::continuations::ContinuationList;
use crate::error::{Error, WaitStatus};
use crate::future::FutureHandle;
use crate::state::Observer;

pub trait FutureSequence: Send + Sized + 'static {
    /// The unwrapped values of all leaves, in order: a tuple of outputs
    /// for tuple sequences, a `Vec` of outputs for `Vec` sequences.
    type Values: Send + 'static;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if at least one leaf is valid.
    fn any_valid(&self) -> bool;

    fn is_ready_at(&self, index: usize) -> bool;

    /// Index of the first ready leaf, scanning in order.
    fn ready_index(&self) -> Option<usize> {
        (0..self.len()).find(|&index| self.is_ready_at(index))
    }

    fn wait_at(&self, index: usize) -> Result<(), Error>;

    fn wait_timeout_at(&self, index: usize, timeout: Duration) -> Result<WaitStatus, Error>;

    /// `true` if the leaf at `index` supports lazy continuations.
    fn lazy_continuable_at(&self, index: usize) -> bool;

    /// Continuation list of a lazily continuable leaf.
    fn continuation_list_at(&self, index: usize) -> Option<Arc<ContinuationList>>;

    /// Address-stable observer of the leaf at `index`, if it has one.
    fn observer_at(&self, index: usize) -> Option<Observer>;

    /// Waits for every leaf and extracts all outputs.
    fn take_values(self) -> Result<Self::Values, Error>;
}

impl<F> FutureSequence for Vec<F>
where
    F: FutureHandle,
{
    type Values = Vec<F::Output>;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn any_valid(&self) -> bool {
        self.iter().any(|future| future.valid())
    }

    fn is_ready_at(&self, index: usize) -> bool {
        self.get(index).is_some_and(|future| future.is_ready())
    }

    fn wait_at(&self, index: usize) -> Result<(), Error> {
        self.get(index).ok_or(Error::NoState)?.wait()
    }

    fn wait_timeout_at(&self, index: usize, timeout: Duration) -> Result<WaitStatus, Error> {
        self.get(index).ok_or(Error::NoState)?.wait_for(timeout)
    }

    fn lazy_continuable_at(&self, index: usize) -> bool {
        self.get(index).is_some_and(|future| future.lazy_continuable())
    }

    fn continuation_list_at(&self, index: usize) -> Option<Arc<ContinuationList>> {
        self.get(index).and_then(|future| future.continuation_list())
    }

    fn observer_at(&self, index: usize) -> Option<Observer> {
        self.get(index).and_then(|future| future.observer())
    }

    fn take_values(self) -> Result<Self::Values, Error> {
        let mut values = Vec::with_capacity(self.len());
        for future in self {
            values.push(future.into_output()?);
        }
        Ok(values)
    }
}

/// The empty sequence: a conjunction over it is immediately ready, a
/// disjunction reports the sentinel index.
impl FutureSequence for () {
    type Values = ();

    fn len(&self) -> usize {
        0
    }

    fn any_valid(&self) -> bool {
        false
    }

    fn is_ready_at(&self, _index: usize) -> bool {
        false
    }

    fn wait_at(&self, _index: usize) -> Result<(), Error> {
        Err(Error::NoState)
    }

    fn wait_timeout_at(&self, _index: usize, _timeout: Duration) -> Result<WaitStatus, Error> {
        Err(Error::NoState)
    }

    fn lazy_continuable_at(&self, _index: usize) -> bool {
        false
    }

    fn continuation_list_at(&self, _index: usize) -> Option<Arc<ContinuationList>> {
        None
    }

    fn observer_at(&self, _index: usize) -> Option<Observer> {
        None
    }

    fn take_values(self) -> Result<(), Error> {
        Ok(())
    }
}

macro_rules! impl_future_sequence {
    ($len:expr, $(($idx:tt, $F:ident, $f:ident)),+) => {
        impl<$($F),+> FutureSequence for ($($F,)+)
        where
            $($F: FutureHandle,)+
        {
            type Values = ($($F::Output,)+);

            fn len(&self) -> usize {
                $len
            }

            fn any_valid(&self) -> bool {
                $(self.$idx.valid())||+
            }

            fn is_ready_at(&self, index: usize) -> bool {
                match index {
                    $($idx => self.$idx.is_ready(),)+
                    _ => false,
                }
            }

            fn wait_at(&self, index: usize) -> Result<(), Error> {
                match index {
                    $($idx => self.$idx.wait(),)+
                    _ => Err(Error::NoState),
                }
            }

            fn wait_timeout_at(
                &self,
                index: usize,
                timeout: Duration,
            ) -> Result<WaitStatus, Error> {
                match index {
                    $($idx => self.$idx.wait_for(timeout),)+
                    _ => Err(Error::NoState),
                }
            }

            fn lazy_continuable_at(&self, index: usize) -> bool {
                match index {
                    $($idx => self.$idx.lazy_continuable(),)+
                    _ => false,
                }
            }

            fn continuation_list_at(&self, index: usize) -> Option<Arc<ContinuationList>> {
                match index {
                    $($idx => self.$idx.continuation_list(),)+
                    _ => None,
                }
            }

            fn observer_at(&self, index: usize) -> Option<Observer> {
                match index {
                    $($idx => self.$idx.observer(),)+
                    _ => None,
                }
            }

            fn take_values(self) -> Result<Self::Values, Error> {
                let ($($f,)+) = self;
                Ok(($($f.into_output()?,)+))
            }
        }
    };
}

impl_future_sequence!(1, (0, F0, f0));
impl_future_sequence!(2, (0, F0, f0), (1, F1, f1));
impl_future_sequence!(3, (0, F0, f0), (1, F1, f1), (2, F2, f2));
impl_future_sequence!(4, (0, F0, f0), (1, F1, f1), (2, F2, f2), (3, F3, f3));
impl_future_sequence!(
    5,
    (0, F0, f0),
    (1, F1, f1),
    (2, F2, f2),
    (3, F3, f3),
    (4, F4, f4)
);
impl_future_sequence!(
    6,
    (0, F0, f0),
    (1, F1, f1),
    (2, F2, f2),
    (3, F3, f3),
    (4, F4, f4),
    (5, F5, f5)
);
impl_future_sequence!(
    7,
    (0, F0, f0),
    (1, F1, f1),
    (2, F2, f2),
    (3, F3, f3),
    (4, F4, f4),
    (5, F5, f5),
    (6, F6, f6)
);
impl_future_sequence!(
    8,
    (0, F0, f0),
    (1, F1, f1),
    (2, F2, f2),
    (3, F3, f3),
    (4, F4, f4),
    (5, F5, f5),
    (6, F6, f6),
    (7, F7, f7)
);
