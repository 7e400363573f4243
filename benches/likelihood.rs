use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lot_mcmc::likelihood::{compute_likelihood, Counts, EditNoise, ObservationWeight};

fn counts(entries: &[(&str, u64)]) -> Counts {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn bench_likelihood(c: &mut Criterion) {
    let sampled: Counts = (1..=40)
        .map(|n| ("a".repeat(n) + &"b".repeat(n), 512 >> n.min(9)))
        .collect();
    let observed = counts(&[("ab", 48), ("aabb", 26), ("aaabbb", 13), ("aaabbbb", 2)]);

    c.bench_function("compute_likelihood 40 sampled strings", |b| {
        b.iter(|| compute_likelihood(black_box(&sampled), black_box(&observed)))
    });

    let unit = EditNoise::default().with_weighting(ObservationWeight::Unit);
    c.bench_function("edit noise unit weighting", |b| {
        b.iter(|| unit.score(black_box(&sampled), black_box(&observed)))
    });

    let noise = EditNoise::default();
    let far = "ba".repeat(40);
    c.bench_function("string_log_prob 80 char miss", |b| {
        b.iter(|| noise.string_log_prob(black_box(&sampled), black_box(&far)))
    });
}

criterion_group!(benches, bench_likelihood);
criterion_main!(benches);
