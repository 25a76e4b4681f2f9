use std::future::Future;

/// Drive a future that needs no I/O reactor (in-process stores only).
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    futures::executor::block_on(f)
}

#[cfg(feature = "redis-tokio")]
pub(super) fn block_on_redis<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
pub(super) fn block_on_redis<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    smol::block_on(f)
}
