//! Assertion macros shared by integration tests.

/// Await a receive future under a timeout and panic with the call site on
/// timeout or a closed channel.
#[macro_export]
macro_rules! recv_within {
    ($dur:expr, $fut:expr) => {{
        ::tokio::time::timeout($dur, $fut)
            .await
            .expect(concat!("timed out at ", file!(), ":", line!()))
            .expect(concat!("channel closed at ", file!(), ":", line!()))
    }};
}

pub use crate::recv_within;
