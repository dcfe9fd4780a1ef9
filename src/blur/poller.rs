use crate::blur::messages::BlurCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Enqueues a command on a fixed period until stopped or the queue closes.
pub struct PeriodicTimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    pub fn spawn(
        name: &str,
        period: Duration,
        tx: Sender<BlurCommand>,
        command: BlurCommand,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    while Instant::now() < next {
                        if thread_stop.load(Ordering::Acquire) {
                            return;
                        }
                        thread::sleep(SLEEP_SLICE.min(next.saturating_duration_since(Instant::now())));
                    }
                    if thread_stop.load(Ordering::Acquire) || tx.send(command).is_err() {
                        return;
                    }
                    next += period;
                    // Do not try to catch up after a long stall.
                    let now = Instant::now();
                    if next < now {
                        next = now + period;
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn timer_enqueues_until_stopped() {
        let (tx, rx) = channel();
        let mut timer = PeriodicTimer::spawn(
            "test-timer",
            Duration::from_millis(20),
            tx,
            BlurCommand::ReEvaluate,
        )
        .expect("spawn timer");
        let first = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("timer should fire");
        assert_eq!(first, BlurCommand::ReEvaluate);
        timer.stop();
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(80));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn timer_exits_when_queue_closes() {
        let (tx, rx) = channel();
        let mut timer = PeriodicTimer::spawn(
            "test-timer",
            Duration::from_millis(10),
            tx,
            BlurCommand::ReEvaluate,
        )
        .expect("spawn timer");
        drop(rx);
        std::thread::sleep(Duration::from_millis(50));
        timer.stop();
    }
}
