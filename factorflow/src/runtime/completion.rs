use std::sync::{Condvar, Mutex};

/// Single-use barrier between the last finishing worker and the orchestrator.
///
/// The flag is set under the same mutex the waiter checks, so a notify that
/// happens before `wait` is never lost.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        CompletionSignal {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        *signalled = true;
        self.condvar.notify_all();
    }

    pub fn wait(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        while !*signalled {
            signalled = self.condvar.wait(signalled).unwrap();
        }
    }

    pub fn is_signalled(&self) -> bool {
        *self.signalled.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::runtime::completion::CompletionSignal;

    #[test]
    pub fn notify_before_wait_test() {
        let signal = CompletionSignal::new();
        signal.notify();
        assert!(signal.is_signalled());
        // must return immediately
        signal.wait();
    }

    #[test]
    pub fn notify_from_other_thread_test() {
        let signal = CompletionSignal::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                signal.notify();
            });
            signal.wait();
        });
        assert!(signal.is_signalled());
    }
}
