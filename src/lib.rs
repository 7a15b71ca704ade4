use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
};

pub mod adapter;
pub mod bet_key;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod events;
pub mod generator;
pub mod lifecycle;
pub mod replay;
pub mod symbols;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use adapter::{
    ChainAdapter,
    SeedSource,
    TransactionLookup,
    TxRef,
};
pub use bet_key::{
    BetKey,
    PartyId,
};
pub use config::{
    ControllerConfig,
    GameConfig,
};
pub use error::{
    Result,
    SpinError,
};
pub use evaluate::{
    SpinOutcome,
    WinLevel,
};
pub use generator::Seed;
pub use lifecycle::{
    SpinController,
    SpinId,
    SpinStatus,
};
pub use replay::{
    Reconstructor,
    Replay,
};
pub use symbols::{
    Symbol,
    SymbolGrid,
};

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
