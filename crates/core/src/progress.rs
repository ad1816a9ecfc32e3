use std::sync::Mutex;

/// Count of finished units shared by the workers of one course.
///
/// Created once per course before any worker starts; workers share it by reference.
#[derive(Debug)]
pub struct ProgressCounter {
    count: Mutex<u64>,
    total: u64,
}

impl ProgressCounter {
    pub fn new(total: u64) -> Self {
        Self {
            count: Mutex::new(0),
            total,
        }
    }

    /// Increments the count and returns the new value.
    pub fn incr_and_get(&self) -> u64 {
        let mut count = match self.count.lock() {
            Ok(count) => count,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count += 1;
        *count
    }

    pub fn get(&self) -> u64 {
        match self.count.lock() {
            Ok(count) => *count,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn concurrent_increments_are_never_lost() {
        let counter = Arc::new(ProgressCounter::new(800));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || (0..100).map(|_| counter.incr_and_get()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap_or_default() {
                assert!(seen.insert(value), "value {value} handed out twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(counter.get(), 800);
        assert_eq!(counter.total(), 800);
    }

    #[test]
    fn starts_at_zero() {
        let counter = ProgressCounter::new(3);
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.incr_and_get(), 1);
        assert_eq!(counter.get(), 1);
    }
}
