use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinError;

/// Run `task` over every input on at most `workers` blocking threads at once.
///
/// Results come back in input order no matter which task finishes first.
/// Returns only after every task has finished; a panicked task is reported
/// after the others have been joined.
pub async fn ordered_map<I, O, F>(inputs: Vec<I>, workers: usize, task: F) -> Result<Vec<O>, JoinError>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    let task = Arc::new(task);
    let results: Vec<Result<O, JoinError>> = stream::iter(inputs)
        .map(|input| {
            let task = Arc::clone(&task);
            tokio::task::spawn_blocking(move || task(input))
        })
        .buffered(workers.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        // Earlier inputs sleep longer, so they finish last.
        let inputs: Vec<u64> = (0..8).collect();
        let out = ordered_map(inputs, 4, |i| {
            std::thread::sleep(Duration::from_millis(40 - i * 5));
            i * 10
        })
        .await
        .unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        ordered_map((0..12).collect::<Vec<u32>>(), 3, move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            r.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_input() {
        let out: Vec<u8> = ordered_map(Vec::<u8>::new(), 2, |x| x).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let result = ordered_map(vec![1, 2, 3], 2, |x: i32| {
            if x == 2 {
                panic!("boom");
            }
            x
        })
        .await;
        assert!(result.unwrap_err().is_panic());
    }
}
