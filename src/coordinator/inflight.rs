//! Per-key single-flight gate.
//!
//! The first resolver of a key becomes the leader and does the work; every
//! resolver that joins while the flight is open waits for the leader's
//! published result instead of repeating the work.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

type Slot<T> = Arc<watch::Sender<Option<T>>>;

/// Open flights by key; different keys never contend.
pub struct SingleFlight<T> {
    flights: DashMap<String, Slot<T>>,
}

/// What a resolver should do after joining a flight.
pub enum Role<'a, T> {
    Leader(Leader<'a, T>),
    Follower(Follower<T>),
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    /// Lead the flight for `key`, or follow the one already open.
    pub fn join(&self, key: &str) -> Role<'_, T> {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(open) => Role::Follower(Follower {
                rx: open.get().subscribe(),
            }),
            Entry::Vacant(vacant) => {
                let (tx, _) = watch::channel(None);
                let slot = Arc::new(tx);
                vacant.insert(slot.clone());
                Role::Leader(Leader {
                    flights: self,
                    key: key.to_string(),
                    slot,
                })
            }
        }
    }

    /// Keys with an open flight.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The resolver doing the work. Dropping it without `complete` (cancelled or
/// timed out) closes the flight with no result.
pub struct Leader<'a, T> {
    flights: &'a SingleFlight<T>,
    key: String,
    slot: Slot<T>,
}

impl<T> Leader<'_, T> {
    /// Publish `value` to every follower and close the flight.
    pub fn complete(self, value: T) {
        self.slot.send_replace(Some(value));
    }
}

impl<T> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        self.flights
            .flights
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.slot));
    }
}

/// A resolver waiting on another's flight.
pub struct Follower<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Follower<T> {
    /// The leader's result, or `None` if the leader went away without one.
    pub async fn wait(mut self) -> Option<T> {
        loop {
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_entry_removed_after_leader() {
        let flights = SingleFlight::<u32>::new();
        {
            let role = flights.join("k");
            assert!(matches!(role, Role::Leader(_)));
            assert_eq!(flights.len(), 1);
        }
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_followers_receive_leader_result() {
        let flights = Arc::new(SingleFlight::<Result<u32, String>>::new());
        let work = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let flights = flights.clone();
                let work = work.clone();
                tokio::spawn(async move {
                    match flights.join("k") {
                        Role::Leader(leader) => {
                            work.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            let result = Err("upstream down".to_string());
                            leader.complete(result.clone());
                            result
                        }
                        Role::Follower(follower) => follower.wait().await.unwrap(),
                    }
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Err("upstream down".to_string()));
        }
        assert_eq!(work.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_flight_wakes_followers_empty() {
        let flights = SingleFlight::<u32>::new();
        let leader = match flights.join("k") {
            Role::Leader(leader) => leader,
            Role::Follower(_) => panic!("first join must lead"),
        };
        let follower = match flights.join("k") {
            Role::Follower(follower) => follower,
            Role::Leader(_) => panic!("second join must follow"),
        };
        drop(leader);

        assert_eq!(follower.wait().await, None);
        assert!(matches!(flights.join("k"), Role::Leader(_)));
    }

    #[test]
    fn test_different_keys_do_not_share() {
        let flights = SingleFlight::<u32>::new();
        let _a = flights.join("a");
        let b = flights.join("b");
        assert!(matches!(b, Role::Leader(_)));
        assert_eq!(flights.len(), 2);
    }
}
