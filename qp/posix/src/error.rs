//! Errors reported by the POSIX port

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosixError {
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("tick rate {0} already has a ticker thread")]
    TickerRunning(u8),
    #[error("thread {0} panicked")]
    ThreadPanicked(String),
    #[error("failed to install the interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
