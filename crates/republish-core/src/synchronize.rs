//! Keeping several published values equal.
//!
//! [`synchronize`] links two or more [`Published`] values of the same type.
//! Writing any one of them writes the new value to all the others exactly
//! once; the writes the relay makes itself are not relayed again.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::targets;
use crate::published::{Published, WeakPublished};
use crate::signal::Subscription;

struct Relay<T> {
    participants: Vec<WeakPublished<T>>,
    /// Index of the participant whose write is being relayed.
    current_sender: Mutex<Option<usize>>,
}

impl<T: Clone + Send + Sync + 'static> Relay<T> {
    fn broadcast(&self, sender: usize, value: &T) {
        {
            let mut current = self.current_sender.lock();
            if current.is_some() {
                return;
            }
            *current = Some(sender);
        }
        let _reset = ResetSender(&self.current_sender);

        tracing::trace!(target: targets::SYNCHRONIZE, sender, "relaying value");
        for (index, participant) in self.participants.iter().enumerate() {
            if index == sender {
                continue;
            }
            if let Some(participant) = participant.upgrade() {
                participant.set(value.clone());
            }
        }
    }
}

struct ResetSender<'a>(&'a Mutex<Option<usize>>);

impl Drop for ResetSender<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Keep every value in `participants` equal until the returned subscription
/// is dropped.
///
/// The participants start out with the value of the last one. Participants
/// are held weakly; a dropped participant simply stops taking part.
///
/// # Example
///
/// ```
/// use republish_core::{synchronize, Published};
///
/// let a = Published::new(1);
/// let b = Published::new(2);
/// let _sync = synchronize(&[&a, &b]);
/// assert_eq!(a.get(), 2);
///
/// a.set(5);
/// assert_eq!(b.get(), 5);
/// ```
pub fn synchronize<T>(participants: &[&Published<T>]) -> Subscription
where
    T: Clone + Send + Sync + 'static,
{
    let relay = Arc::new(Relay {
        participants: participants.iter().map(|p| p.downgrade()).collect(),
        current_sender: Mutex::new(None),
    });

    if let Some(seed) = participants.last() {
        relay.broadcast(participants.len() - 1, &seed.get());
    }

    let subscriptions: Vec<Subscription> = participants
        .iter()
        .enumerate()
        .map(|(index, participant)| {
            let relay = Arc::clone(&relay);
            participant.subscribe(move |value| relay.broadcast(index, value))
        })
        .collect();

    tracing::debug!(target: targets::SYNCHRONIZE, participants = participants.len(), "synchronized values");
    Subscription::combine(subscriptions)
}

/// Keep two values equal. See [`synchronize`].
pub fn synchronize2<T>(a: &Published<T>, b: &Published<T>) -> Subscription
where
    T: Clone + Send + Sync + 'static,
{
    synchronize(&[a, b])
}
