use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gwas_pipeline::{
    CoordinateConverter, EuchromaticRegions, GenomeSizes,
    genome::Interval,
    gwas::{VariantPositions, genome_order},
};

const CHROMOSOMES: u64 = 12;
const CHROM_LEN: u64 = 90_000_000;

fn sizes() -> GenomeSizes {
    GenomeSizes::from_pairs((1..=CHROMOSOMES).map(|i| (format!("SL4.0ch{i:02}"), CHROM_LEN))).unwrap()
}

fn regions() -> Vec<EuchromaticRegions> {
    (1..=CHROMOSOMES)
        .filter_map(|i| {
            EuchromaticRegions::new(
                format!("SL4.0ch{i:02}"),
                Interval { start: 0, end: 20_000_000 },
                Interval { start: 60_000_000, end: CHROM_LEN },
            )
        })
        .collect()
}

fn variant_ids(count: u64) -> Vec<String> {
    (0..count)
        .map(|i| {
            let chrom = CHROMOSOMES - i % CHROMOSOMES;
            let pos = (i * 7_919) % CHROM_LEN + 1;
            format!("SL4.0ch{chrom:02}:{pos}")
        })
        .collect()
}

fn bench_transform(c: &mut Criterion) {
    let linear = CoordinateConverter::linear(&sizes());
    let gap_aware = CoordinateConverter::gap_aware(regions()).unwrap();

    let mut group = c.benchmark_group("transform");
    for (label, converter) in [("linear", &linear), ("gap_aware", &gap_aware)] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut acc = 0u64;
                for pos in (1..10_000u64).map(|p| p * 1_000) {
                    if let Ok(x) = converter.transform(black_box("sl4.0CH07"), pos) {
                        acc = acc.wrapping_add(x);
                    }
                }
                acc
            })
        });
    }
    group.finish();
}

fn bench_genome_order(c: &mut Criterion) {
    let converter = CoordinateConverter::gap_aware(regions()).unwrap();
    let positions = VariantPositions::default();

    let mut group = c.benchmark_group("genome_order");
    for count in [1_000u64, 100_000] {
        let ids = variant_ids(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &ids, |b, ids| {
            b.iter(|| genome_order(black_box(ids), &positions, &converter).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transform, bench_genome_order);
criterion_main!(benches);
