//! Property tests over random billing populations.
//!
//! Whatever the data looks like, a scan must respect the corroboration
//! ceilings, rank in non-increasing score order, and not depend on the order
//! rows arrive in or detectors run in.

use claimwatch_core::constants::tier_ceiling;
use claimwatch_core::{MemoryStore, ProviderMonthRecord};
use claimwatch_engine::{ScanConfig, Scanner, ScanReport};
use claimwatch_engine::scan::peer_distribution;
use claimwatch_tests::helpers::record;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

fn arb_rows() -> impl Strategy<Value = Vec<ProviderMonthRecord>> {
    prop::collection::vec((0u32..25, 1u32..=12, 0u64..3_000, 0u64..5_000_000), 1..200)
        .prop_map(|raw| raw.into_iter().map(|(p, m, c, paid)| record(p, m, c, paid)).collect())
}

fn scanner(threshold: f64) -> Scanner {
    let mut cfg = ScanConfig::default();
    cfg.rank.threshold = threshold;
    Scanner::new(cfg).unwrap()
}

fn check_bounds(report: &ScanReport, threshold: f64) -> Result<(), TestCaseError> {
    for s in &report.scores {
        prop_assert_eq!(s.tier, s.contributing_detectors.len());
        prop_assert!(s.score >= 0.0);
        prop_assert!(s.score <= tier_ceiling(s.tier), "{} above ceiling for tier {}", s.score, s.tier);
        if s.tier >= 3 {
            prop_assert_eq!(s.score, 1.0);
        }
    }
    for (i, e) in report.ranked.iter().enumerate() {
        prop_assert_eq!(e.rank, i + 1);
        prop_assert!(e.tier > 0);
        prop_assert!(e.score >= threshold);
    }
    for w in report.ranked.windows(2) {
        prop_assert!(w[0].score >= w[1].score);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scores_respect_tier_ceilings(rows in arb_rows(), threshold in 0.0f64..=1.0) {
        let store = MemoryStore::new(rows);
        let report = scanner(threshold).run(&store).unwrap();
        prop_assert_eq!(report.scores.len(), store.provider_count());
        check_bounds(&report, threshold)?;
    }

    #[test]
    fn row_order_does_not_matter(rows in arb_rows(), seed in any::<u64>()) {
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let scanner = scanner(0.0);
        let a = scanner.run(&MemoryStore::new(rows)).unwrap();
        let b = scanner.run(&MemoryStore::new(shuffled)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn detector_order_does_not_matter(rows in arb_rows(), seed in any::<u64>()) {
        let store = MemoryStore::new(rows);
        let scanner = scanner(0.0);
        let distribution = peer_distribution(&store).unwrap();

        let forward = scanner.config().detectors(distribution.clone());
        let mut shuffled = scanner.config().detectors(distribution.clone());
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let a = scanner.run_with(&store, distribution.clone(), &forward).unwrap();
        let b = scanner.run_with(&store, distribution, &shuffled).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn raising_threshold_only_removes_entries(rows in arb_rows(), lo in 0.0f64..0.5, hi in 0.5f64..=1.0) {
        let store = MemoryStore::new(rows);
        let loose = scanner(lo).run(&store).unwrap();
        let strict = scanner(hi).run(&store).unwrap();
        prop_assert!(strict.ranked.len() <= loose.ranked.len());
        for (s, l) in strict.ranked.iter().zip(&loose.ranked) {
            prop_assert_eq!(&s.provider_id, &l.provider_id);
        }
    }
}
