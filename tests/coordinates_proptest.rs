use gwas_pipeline::{
    CoordError, CoordinateConverter, EuchromaticRegions, GenomeSizes, genome::Interval,
};
use proptest::prelude::*;

fn genome_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
    proptest::collection::btree_map("[a-z]{1,6}[0-9]{0,2}", 1u64..1_000_000, 1..12)
        .prop_map(|map| map.into_iter().collect())
}

fn arms_strategy() -> impl Strategy<Value = Vec<EuchromaticRegions>> {
    proptest::collection::btree_map(
        "chr[0-9]{1,2}",
        (0u64..1_000, 1u64..5_000, 0u64..5_000, 1u64..5_000),
        1..8,
    )
    .prop_map(|map| {
        map.into_iter()
            .filter_map(|(name, (a_start, a_len, gap, b_len))| {
                let arm_a = Interval { start: a_start, end: a_start + a_len };
                let arm_b = Interval { start: arm_a.end + gap, end: arm_a.end + gap + b_len };
                EuchromaticRegions::new(name, arm_a, arm_b)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn spans_tile_the_genome(pairs in genome_strategy()) {
        let sizes = GenomeSizes::from_pairs(pairs.clone()).unwrap();
        let converter = CoordinateConverter::linear(&sizes);
        let spans = converter.spans();

        let total: u64 = pairs.iter().map(|(_, len)| len).sum();
        prop_assert_eq!(converter.genome_size(), total);
        prop_assert_eq!(spans.first().unwrap().start, 0);
        prop_assert_eq!(spans.last().unwrap().end, total);
        for pair in spans.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
            prop_assert!(pair[0].name.to_lowercase() <= pair[1].name.to_lowercase());
        }
        for span in &spans {
            prop_assert_eq!(Some(span.len()), sizes.length(&span.name));
        }
    }

    #[test]
    fn transform_is_offset_plus_position(pairs in genome_strategy(), pick in any::<prop::sample::Index>(), pos in 0u64..1_000_000) {
        let sizes = GenomeSizes::from_pairs(pairs.clone()).unwrap();
        let converter = CoordinateConverter::linear(&sizes);
        let (name, _) = &pairs[pick.index(pairs.len())];

        let here = converter.transform(name, pos).unwrap();
        prop_assert_eq!(converter.transform(name, pos + 1).unwrap(), here + 1);
        prop_assert_eq!(converter.transform(&name.to_uppercase(), pos).unwrap(), here);
        prop_assert_eq!(converter.transform_bytes(name.as_bytes(), pos).unwrap(), here);
    }

    #[test]
    fn unknown_names_are_rejected(pairs in genome_strategy(), pos in 0u64..1_000) {
        let sizes = GenomeSizes::from_pairs(pairs).unwrap();
        let converter = CoordinateConverter::linear(&sizes);
        prop_assert_eq!(
            converter.transform("not-a-chromosome", pos),
            Err(CoordError::UnknownChromosome("not-a-chromosome".to_string()))
        );
    }

    #[test]
    fn gap_aware_axis_skips_pericentromeres(regions in arms_strategy()) {
        prop_assume!(!regions.is_empty());
        let converter = CoordinateConverter::gap_aware(regions.clone()).unwrap();
        let total: u64 = regions.iter().map(EuchromaticRegions::euchromatic_size).sum();
        prop_assert_eq!(converter.genome_size(), total);

        for region in &regions {
            let gap = region.gap();
            let before = converter.transform(&region.name, gap.start).unwrap();
            let after = converter.transform(&region.name, gap.end).unwrap();
            prop_assert_eq!(after, before);
            if gap.len() > 1 {
                let err = converter.transform(&region.name, gap.start + 1).unwrap_err();
                prop_assert!(err.is_recoverable());
            }
            let last = converter.transform(&region.name, region.arm_b.end).unwrap();
            prop_assert!(last >= before);
        }
    }
}
