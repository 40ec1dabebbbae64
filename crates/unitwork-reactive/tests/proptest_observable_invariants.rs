//! Property-based invariant tests for observables, derived values and
//! producers.
//!
//! **Observable:**
//! 1. Version equals the number of value-changing sets.
//! 2. Subscribers see exactly the sequence of distinct changes.
//!
//! **Computed:**
//! 3. `get()` equals the map of the current sources after any write sequence.
//! 4. Published changes never repeat a value back to back.
//!
//! **Producer:**
//! 5. A run delivers its values in order followed by exactly one terminal,
//!    regardless of what is sent after termination.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use unitwork_reactive::{Computed, Event, Observable, Producer};

proptest! {
    #[test]
    fn version_counts_changes(writes in proptest::collection::vec(0u8..4, 0..50)) {
        let obs = Observable::new(0u8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = obs.subscribe(move |v| s.lock().unwrap().push(*v));

        let mut expected = Vec::new();
        let mut current = 0u8;
        for w in writes {
            obs.set(w);
            if w != current {
                expected.push(w);
                current = w;
            }
        }

        prop_assert_eq!(obs.version(), expected.len() as u64);
        prop_assert_eq!(seen.lock().unwrap().clone(), expected);
        prop_assert_eq!(obs.get(), current);
    }

    #[test]
    fn combined_value_is_never_stale(
        writes in proptest::collection::vec((any::<bool>(), 0i32..10), 0..40)
    ) {
        let a = Observable::new(0i32);
        let b = Observable::new(0i32);
        let sum = Computed::combine(&a, &b, |x: &i32, y: &i32| x + y);
        let published = Arc::new(Mutex::new(vec![sum.get()]));
        let p = Arc::clone(&published);
        let _sub = sum.subscribe(move |v| p.lock().unwrap().push(*v));

        for (to_a, value) in writes {
            if to_a { a.set(value) } else { b.set(value) }
            prop_assert_eq!(sum.get(), a.get() + b.get());
            prop_assert_eq!(published.lock().unwrap().last().copied(), Some(sum.get()));
        }

        let published = published.lock().unwrap().clone();
        for pair in published.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn single_terminal(
        values in proptest::collection::vec(any::<u16>(), 0..20),
        fail in any::<bool>(),
        trailing in proptest::collection::vec(any::<u16>(), 0..5),
    ) {
        let script = values.clone();
        let producer: Producer<u16, ()> = Producer::new(move |sink| {
            for v in &script {
                sink.send_value(*v);
            }
            if fail { sink.send_failed(()) } else { sink.send_completed() }
            for v in &trailing {
                sink.send_value(*v);
            }
            sink.send_completed();
        });

        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let handle = producer.start(move |e| l.lock().unwrap().push(e));

        let mut expected: Vec<Event<u16, ()>> = values.into_iter().map(Event::Value).collect();
        expected.push(if fail { Event::Failed(()) } else { Event::Completed });
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
        prop_assert!(handle.is_disposed());
    }
}
