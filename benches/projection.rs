use cadence::domain::{DateWindow, Frequency, LedgerEntry, Obligation, ObligationKind};
use cadence::services::{LedgerProjector, RecurrenceExpander};
use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn sample_obligations(count: usize) -> Vec<Obligation> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    (0..count)
        .map(|idx| {
            let begin = (start + Duration::days((idx % 28) as i64))
                .and_hms_opt(9, 0, 0)
                .unwrap();
            let (kind, frequency) = match idx % 4 {
                0 => (ObligationKind::Expense, Frequency::Weekly),
                1 => (ObligationKind::Loan, Frequency::Monthly),
                2 => (ObligationKind::Payroll, Frequency::Monthly),
                _ => (ObligationKind::Expense, Frequency::Daily),
            };
            Obligation::new(kind, format!("obligation-{idx}"), 10.0 + idx as f64, begin, frequency)
        })
        .collect()
}

fn sample_entries(count: usize) -> Vec<LedgerEntry> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    (0..count)
        .map(|idx| {
            let date = start + Duration::days((idx % 365) as i64);
            let amount = if idx % 2 == 0 { 120.0 } else { -75.0 };
            if idx % 5 == 0 {
                LedgerEntry::realized(format!("txn-{idx}"), date, amount)
            } else {
                LedgerEntry::projected(date, amount)
            }
        })
        .collect()
}

fn bench_expansion(c: &mut Criterion) {
    let obligations = sample_obligations(100);
    let window = DateWindow::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2029, 12, 31).unwrap(),
    )
    .unwrap();

    c.bench_function("expand_100_obligations_5y", |b| {
        b.iter(|| RecurrenceExpander::expand_all(black_box(&obligations), window).unwrap())
    });
}

fn bench_projection(c: &mut Criterion) {
    let entries = sample_entries(10_000);

    c.bench_function("project_10k_entries", |b| {
        b.iter_batched(
            || entries.clone(),
            |entries| LedgerProjector::project(black_box(5_000.0), entries).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_expansion, bench_projection);
criterion_main!(benches);
