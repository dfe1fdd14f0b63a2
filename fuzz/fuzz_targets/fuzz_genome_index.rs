#![no_main]

use gwas_pipeline::{CoordinateConverter, genome};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    // Parsing must never panic; a parsed index must build a converter whose
    // spans cover the whole genome.
    if let Ok(sizes) = genome::parse_genome_sizes(&text)
        && !sizes.is_empty()
    {
        let converter = CoordinateConverter::linear(&sizes);
        assert_eq!(converter.genome_size(), sizes.total_length());
        for chrom in sizes.chromosomes() {
            let _ = converter.transform(&chrom.name, chrom.length);
        }
    }

    if let Ok(regions) = genome::parse_euchromatic_regions(&text)
        && let Ok(converter) = CoordinateConverter::gap_aware(regions.clone())
    {
        for region in &regions {
            let _ = converter.transform(&region.name, region.gap().start);
        }
    }
});
