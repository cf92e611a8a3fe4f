//! Per-user serialization of cart mutations.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use common::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async lock per user.
///
/// Entries are held weakly: a user's lock lives only as long as someone holds
/// or waits on it, and dead entries are pruned as new users arrive.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<UserId, Weak<Mutex<()>>>>>,
}

/// Exclusive access to one user's cart until dropped.
pub struct UserGuard {
    user: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    pub fn user(&self) -> UserId {
        self.user
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `user`'s lock, then takes it.
    pub async fn acquire(&self, user: UserId) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            match locks.get(&user).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, lock| lock.strong_count() > 0);
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(user, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        UserGuard {
            user,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of users with a live lock entry.
    pub async fn tracked(&self) -> usize {
        let locks = self.locks.lock().await;
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }
}
