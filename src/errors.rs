//! Crate-wide error type. Grounded on `modules/3d/src/errors.rs` in the
//! teacher pack: a `#[derive(Fail)]` enum with short, factual
//! `#[fail(display = ...)]` messages, plus a crate-root `Result` alias.

/// The three ways the scheduler's public API can fail. Workers never
/// surface `Error` themselves: a panicking user job is the user's
/// concern (see `sched::scheduler`'s panic handling), propagated lazily
/// through `complete`, not through this type.
#[derive(Debug, Fail)]
pub enum Error {
    /// `schedule` would have to grow the job pool past
    /// `Config::max_concurrent_jobs` and `Config::strict_allocation` is
    /// set.
    #[fail(
        display = "job pool exhausted: {} concurrent jobs already in flight, strict_allocation is enabled",
        in_flight
    )]
    PoolExhausted { in_flight: usize },

    /// `schedule`, `flush`, `combine_dependencies` or `dispose` was called
    /// from a thread other than the one that constructed the `Scheduler`.
    #[fail(display = "called from a thread other than the scheduler's owning thread")]
    WrongThread,

    /// A handle produced by one `Scheduler` was passed to another.
    #[fail(display = "handle was issued by a different Scheduler instance")]
    ForeignHandle,
}

pub type Result<T> = ::std::result::Result<T, Error>;
