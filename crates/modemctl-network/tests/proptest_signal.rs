//! Property-based tests for signal-strength classification and the event-id
//! allocator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use modemctl_network::envelope::MessageKind;
use modemctl_network::pending::{Completion, PendingTable};
use modemctl_network::{SignalLevel, SignalStrength, SignalThresholds};
use proptest::prelude::*;

const NA: i32 = SignalStrength::UNAVAILABLE;

fn metric() -> impl Strategy<Value = i32> {
    prop_oneof![Just(NA), -200i32..=100]
}

// ─── Classification ─────────────────────────────────────────────────────────

proptest! {
    /// A stronger RSRP never yields a weaker level, whatever the other
    /// metrics hold and however far outside the measurable range it lies.
    #[test]
    fn level_monotonic_in_rsrp(
        a in i32::MIN..NA,
        b in i32::MIN..NA,
        rssi in metric(),
        rsrq in metric(),
        rssnr in metric(),
    ) {
        let t = SignalThresholds::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let weak = SignalStrength::measured(rssi, lo, rsrq, rssnr, NA, &t).level;
        let strong = SignalStrength::measured(rssi, hi, rsrq, rssnr, NA, &t).level;
        prop_assert!(weak <= strong, "rsrp {lo} -> {weak:?}, rsrp {hi} -> {strong:?}");
        prop_assert_ne!(weak, SignalLevel::Unknown);
    }

    /// Stepping RSRP across either edge of its measurable range with RSSI
    /// held fixed never lowers the level.
    #[test]
    fn range_edges_keep_monotonicity(rssi in -113i32..=-51, step in 1i32..=50) {
        let t = SignalThresholds::default();
        for edge in [-140, -44] {
            let below = SignalStrength::measured(rssi, edge - step, NA, NA, NA, &t).level;
            let at = SignalStrength::measured(rssi, edge, NA, NA, NA, &t).level;
            let above = SignalStrength::measured(rssi, edge + step, NA, NA, NA, &t).level;
            prop_assert!(below <= at && at <= above, "edge {edge}: {below:?} {at:?} {above:?}");
        }
    }

    /// Same inputs, same level; and any combination of values is accepted.
    #[test]
    fn classification_total_and_deterministic(
        rssi in metric(),
        rsrp in metric(),
        rsrq in metric(),
        rssnr in metric(),
        cqi in metric(),
    ) {
        let t = SignalThresholds::default();
        let first = SignalStrength::measured(rssi, rsrp, rsrq, rssnr, cqi, &t);
        let second = SignalStrength::measured(rssi, rsrp, rsrq, rssnr, cqi, &t);
        prop_assert_eq!(first, second);
        prop_assert_eq!(t.grade(first), first);
    }

    /// CQI has no influence on the level.
    #[test]
    fn cqi_is_not_graded(rsrp in metric(), cqi_a in metric(), cqi_b in metric()) {
        let t = SignalThresholds::default();
        prop_assert_eq!(
            SignalStrength::measured(NA, rsrp, NA, NA, cqi_a, &t).level,
            SignalStrength::measured(NA, rsrp, NA, NA, cqi_b, &t).level
        );
    }

    /// Adding a measured primary metric can only lower or keep the level.
    #[test]
    fn extra_metric_never_raises_level(rsrp in -140i32..=-44, rsrq in -34i32..=3) {
        let t = SignalThresholds::default();
        let alone = SignalStrength::measured(NA, rsrp, NA, NA, NA, &t).level;
        let both = SignalStrength::measured(NA, rsrp, rsrq, NA, NA, &t).level;
        prop_assert!(both <= alone);
    }
}

// ─── Event-id allocation ────────────────────────────────────────────────────

proptest! {
    /// Outstanding ids are always unique, however the allocator wraps.
    #[test]
    fn outstanding_ids_unique(
        max_event_id in 3u32..=40,
        ops in prop::collection::vec(any::<bool>(), 1..200),
    ) {
        let table = PendingTable::new(1, max_event_id);
        let completed = Arc::new(AtomicUsize::new(0));
        let mut live = Vec::new();

        for insert in ops {
            if insert || live.is_empty() {
                let counter = completed.clone();
                match table.insert(0, MessageKind::ScanResult, Box::new(move |_: Completion| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })) {
                    Ok(id) => {
                        prop_assert!(id <= max_event_id);
                        prop_assert!(!live.contains(&id), "id {id} reissued while pending");
                        live.push(id);
                    }
                    Err(_) => prop_assert_eq!(live.len(), max_event_id as usize + 1),
                }
            } else {
                let id = live.remove(0);
                let entry = table.take(0, id);
                prop_assert!(entry.is_some());
            }
            prop_assert_eq!(table.len(0), live.len());
        }
        prop_assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
