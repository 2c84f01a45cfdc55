//! Tests for background daemons

#[cfg(test)]
mod tests {
    use crate::daemon::{spawn, spawn_periodic};
    use std::thread;
    use std::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_periodic_daemon_runs_until_stopped() {
        // Arrange
        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cycles);

        // Act
        let mut handle = spawn_periodic("test-periodic", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while cycles.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "daemon did not tick");
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop();

        // Assert
        let after_stop = cycles.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cycles.load(Ordering::SeqCst), after_stop);
        assert!(!handle.is_running());
        assert_eq!(handle.name(), "test-periodic");
    }

    #[test]
    fn test_drop_stops_daemon() {
        let handle = spawn("test-drop", |shutdown| {
            let _ = shutdown.recv();
        })
        .unwrap();

        drop(handle);
    }
}
