//! Option records of the future families.
//!
//! Every handle family is the generic handle instantiated at one of the
//! records below. The record names the capabilities stored in the state
//! and, through its associated types, the family a `then` continuation
//! produces. This is the compile-time rule table for continuation
//! attachment.

mod sealed {
    pub trait Sealed {}
}

/// Capability record of a future family.
///
/// The trait is sealed; the six records below are the only instances.
pub trait FutureOptions: sealed::Sealed + Send + Sync + 'static {
    /// A continuation list is stored in the state.
    const CONTINUABLE: bool;
    /// A stop source is stored in the state.
    const STOPPABLE: bool;
    /// The state stores its task and launches it on first wait.
    const DEFERRED: bool;

    /// Family produced by `then` for a plain continuation.
    type ThenChild: FutureOptions;
    /// Family produced by `then_stop` for a token-taking continuation.
    type ThenStopChild: FutureOptions;
}

/// Families whose handles expose the stop source.
pub trait HasStopSource: FutureOptions {}

macro_rules! options {
    ($name:ident, $continuable:expr, $stoppable:expr, $deferred:expr, $then:ident, $then_stop:ident) => {
        #[derive(Copy, Clone, Debug)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl FutureOptions for $name {
            const CONTINUABLE: bool = $continuable;
            const STOPPABLE: bool = $stoppable;
            const DEFERRED: bool = $deferred;

            type ThenChild = $then;
            type ThenStopChild = $then_stop;
        }
    };
}

options!(Plain, false, false, false, Continuable, Stoppable);
options!(Continuable, true, false, false, Continuable, Stoppable);
options!(Stoppable, true, true, false, Stoppable, Stoppable);
options!(Deferred, false, false, true, Deferred, StoppableDeferred);
options!(StoppableDeferred, false, true, true, StoppableDeferred, StoppableDeferred);
options!(Value, false, false, false, Continuable, Stoppable);

impl HasStopSource for Stoppable {}
impl HasStopSource for StoppableDeferred {}
