use std::io::Write;
use std::path::PathBuf;

use assert_fs::prelude::*;
use gwas_pipeline::{
    GenomeIndexError, GenomeSizes, GenomeSource,
    genome::{MalformedKind, read_euchromatic_regions},
    phenotype::{PhenotypeTable, read_sample_list},
};

fn gzip_layers(content: &str, layers: usize) -> Vec<u8> {
    let mut data = content.as_bytes().to_vec();
    for _ in 0..layers {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).unwrap();
        data = encoder.finish().unwrap();
    }
    data
}

fn write_gz(dir: &assert_fs::TempDir, name: &str, content: &str, layers: usize) -> PathBuf {
    let file = dir.child(name);
    file.write_binary(&gzip_layers(content, layers)).unwrap();
    file.path().to_path_buf()
}

#[test]
fn gzipped_fai_builds_linear_axis() {
    let temp = assert_fs::TempDir::new().unwrap();
    let path = write_gz(&temp, "genome.fa.fai.gz", "chr2\t500\t0\t60\t61\nchr1\t1000\t600\t60\t61\n", 1);

    let sizes = GenomeSizes::from_path(&path).unwrap();
    assert_eq!(sizes.length("CHR1"), Some(1000));

    let converter = GenomeSource::SizeIndex(path).load().unwrap();
    assert_eq!(converter.transform("chr2", 1).unwrap(), 1001);
}

#[test]
fn nested_gzip_layers_are_peeled() {
    let temp = assert_fs::TempDir::new().unwrap();
    let path = write_gz(&temp, "arms.tsv.gz.gz", "chr1\t0\t100\t200\t300\n", 2);
    let regions = read_euchromatic_regions(&path).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].euchromatic_size(), 200);
}

#[test]
fn gzipped_phenotypes_and_sample_list() {
    let temp = assert_fs::TempDir::new().unwrap();
    let sheet = write_gz(&temp, "traits.tsv.gz", "SAMPLE_NAME\tweight\nA\t1\nB\t2\n", 1);
    let table = PhenotypeTable::from_path(&sheet).unwrap();
    assert_eq!(table.samples(), &["A".to_string(), "B".to_string()]);

    let list = write_gz(&temp, "keep.txt.gz", "B\n", 1);
    let keep = read_sample_list(&list).unwrap();
    assert_eq!(table.phenotypes("weight", Some(&keep)).unwrap(), vec![("B".to_string(), 2.0)]);
}

#[test]
fn malformed_index_reports_line() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("bad.fai");
    file.write_str("chr1\t1000\nchr2\tlots\n").unwrap();

    match GenomeSizes::from_path(file.path()) {
        Err(GenomeIndexError::Malformed { line, kind, .. }) => {
            assert_eq!(line, 2);
            assert!(matches!(kind, MalformedKind::InvalidInteger { .. }));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
