//! File-backed pipeline test: raw CSV through preprocess, load, scan, export, and profile.

use std::fmt::Write as _;
use std::fs;

use claimwatch_core::{DetectorKind, ProfileError, ProviderId, ScanError};
use claimwatch_engine::{
    ProfileAssembler, ScanConfig, Scanner, load_peer_revenue, load_store, paid_counts_path, preprocess, write_scan_csv,
};

fn npi(seed: u32) -> String {
    format!("{:010}", 1_000_000_000 + seed)
}

/// Raw HHS-shaped rows. Provider 1 bills the same $500.00 on nearly every row
/// and spikes in December; the rest are ordinary.
fn raw_dataset() -> String {
    let mut out = String::from(
        "BILLING_PROVIDER_NPI_NUM,SERVICING_PROVIDER_NPI_NUM,HCPCS_CODE,CLAIM_FROM_MONTH,TOTAL_UNIQUE_BENEFICIARIES,TOTAL_CLAIMS,TOTAL_PAID\n",
    );
    for m in 1..=11 {
        writeln!(out, "{},2000000001,99213,2024-{m:02}-01,5,10,500.00", npi(1)).unwrap();
    }
    writeln!(out, "{},2000000001,99215,2024-12-01,40,80,9000.00", npi(1)).unwrap();

    for p in 2..=60u32 {
        for m in 1..=6u32 {
            let paid = 400 + p * 3 + m * 17;
            // Split across two servicing providers to exercise collapsing.
            writeln!(out, "{},2000000002,99213,2024-{m:02}-01,2,4,{}.00", npi(p), paid / 2).unwrap();
            writeln!(out, "{},2000000003,99213,2024-{m:02}-01,2,4,{}.00", npi(p), paid - paid / 2).unwrap();
        }
    }
    out
}

#[test]
fn preprocess_then_scan_then_profile() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let summary = dir.path().join("processed/provider_month_summary.csv");
    fs::write(&raw, raw_dataset()).unwrap();

    let counts = preprocess(&raw, &summary).unwrap();
    assert_eq!(counts.providers, 60);
    assert_eq!(counts.output_rows, 12 + 59 * 6);
    assert_eq!(counts.input_rows, 12 + 59 * 12);
    assert!(paid_counts_path(&summary).is_file());

    let from_summary = load_store(&summary).unwrap();
    let from_raw = load_store(&raw).unwrap();
    assert_eq!(from_summary.record_count(), from_raw.record_count());

    let scanner = Scanner::new(ScanConfig::default()).unwrap();
    let a = scanner.run(&from_summary).unwrap();
    let b = scanner.run(&from_raw).unwrap();
    assert_eq!(a, b);

    let top = &a.top_ranked()[0];
    assert_eq!(top.provider_id.as_str(), npi(1));
    assert!(top.contributing_detectors.contains(&DetectorKind::SuspiciousConsistency));
    assert!(top.contributing_detectors.contains(&DetectorKind::BillingSpike));

    let export = dir.path().join("scan_results.csv");
    write_scan_csv(&a.ranked, fs::File::create(&export).unwrap()).unwrap();
    let text = fs::read_to_string(&export).unwrap();
    assert!(text.starts_with("rank,provider_id,score,tier,num_flags,detectors\n"));
    assert_eq!(text.lines().count(), a.ranked.len() + 1);

    let id = ProviderId::parse(&npi(1)).unwrap();
    let dossier = ProfileAssembler::new(ScanConfig::default())
        .assemble(&from_summary, &id)
        .unwrap();
    assert_eq!(dossier.claims_summary.months_active, 12);
    assert_eq!(dossier.score.tier, top.tier);
    assert_eq!(dossier.score.score, top.score);
}

#[test]
fn scanning_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    fs::write(&raw, raw_dataset()).unwrap();
    let store = load_store(&raw).unwrap();
    let scanner = Scanner::new(ScanConfig::default()).unwrap();

    let mut first = Vec::new();
    let mut second = Vec::new();
    write_scan_csv(&scanner.run(&store).unwrap().ranked, &mut first).unwrap();
    write_scan_csv(&scanner.run(&store).unwrap().ranked, &mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn peer_table_overrides_store_samples() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let peers = dir.path().join("peers.csv");
    fs::write(&raw, raw_dataset()).unwrap();
    fs::write(&peers, "provider_id,per_claim_revenue\n9000000001,10.0\n9000000002,12.0\n9000000003,14.0\n").unwrap();

    let store = load_store(&raw).unwrap().with_peer_revenue(load_peer_revenue(&peers).unwrap());
    let report = Scanner::new(ScanConfig::default()).unwrap().run(&store).unwrap();
    assert_eq!(report.distribution.population_size, 3);
    assert_eq!(report.distribution.median_revenue_per_claim, 12.0);
}

#[test]
fn profile_of_unknown_provider_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    fs::write(&raw, raw_dataset()).unwrap();
    let store = load_store(&raw).unwrap();
    let missing = ProviderId::parse("9999999999").unwrap();
    let err = ProfileAssembler::new(ScanConfig::default())
        .assemble(&store, &missing)
        .unwrap_err();
    assert!(matches!(err, ScanError::Profile(ProfileError::UnknownProvider(_))));
}
