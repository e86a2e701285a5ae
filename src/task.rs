use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Runs `future`, turning a panic into `Err(message)`.
///
/// Background tasks report back over a channel; a task that panicked would
/// otherwise vanish and leave its caller waiting forever.
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                (*s).to_owned()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "task panicked with a non-string payload".to_owned()
            }
        })
}
