use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use voter_registry::registry::{FieldElement, LeafEncoder, MerkleTree, PoseidonHasher};

fn identifiers(n: u64) -> Vec<FieldElement> {
    (0..n).map(|i| FieldElement::from(i * 7919 + 1)).collect()
}

fn bench_leaves(c: &mut Criterion) {
    let encoder = LeafEncoder::new(PoseidonHasher);
    let mut group = c.benchmark_group("leaf-encoding");
    for size in [64u64, 1024] {
        let ids = identifiers(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &ids, |b, ids| {
            b.iter(|| encoder.leaves(black_box(ids)))
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let encoder = LeafEncoder::new(PoseidonHasher);
    let mut group = c.benchmark_group("tree-build");
    for size in [64u64, 1024, 4096] {
        let leaves = encoder.leaves(&identifiers(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &leaves, |b, leaves| {
            b.iter(|| MerkleTree::build(encoder.hasher(), black_box(leaves.clone())))
        });
    }
    group.finish();
}

fn bench_proof(c: &mut Criterion) {
    let encoder = LeafEncoder::new(PoseidonHasher);
    let leaves = encoder.leaves(&identifiers(1024));
    let tree = MerkleTree::build(encoder.hasher(), leaves).unwrap();
    c.bench_function("siblings-and-directions/1024", |b| {
        b.iter(|| tree.siblings_and_directions(black_box(517)))
    });
}

criterion_group!(benches, bench_leaves, bench_build, bench_proof);
criterion_main!(benches);
