// Group assembly & signing benchmarks.
//
// Covers group id computation and full compose (fee check, assemble, sign)
// at several group sizes, plus encoding and decoding a signed group.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use txgroup_protocol::crypto::Keypair;
use txgroup_protocol::transaction::{
    compute_group_id, decode_group, encode_group, AtomicComposer, Authority, NetworkParameters,
    TransactionBuilder, UnsignedTransaction,
};

const SIZES: [usize; 4] = [2, 4, 8, 16];

fn params() -> NetworkParameters {
    NetworkParameters::at_round(1_000, 1_000, "sandnet-v1", [5u8; 32])
}

fn members(count: usize) -> Vec<(UnsignedTransaction, Keypair)> {
    let params = params();
    (0..count)
        .map(|i| {
            let kp = Keypair::from_seed(&[i as u8 + 1; 32]);
            let to = Keypair::from_seed(&[0xEE; 32]).address();
            let tx = TransactionBuilder::payment(kp.address(), to, 1_000 + i as u64)
                .build(&params)
                .unwrap();
            (tx, kp)
        })
        .collect()
}

fn compose(members: &[(UnsignedTransaction, Keypair)]) -> AtomicComposer {
    members
        .iter()
        .fold(AtomicComposer::new(), |composer, (tx, kp)| {
            composer.add(tx.clone(), Authority::SimpleKey(kp.clone()))
        })
}

fn bench_group_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("group/compute_id");
    for size in SIZES {
        let txs: Vec<UnsignedTransaction> = members(size).into_iter().map(|(tx, _)| tx).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &txs, |b, txs| {
            b.iter(|| compute_group_id(txs));
        });
    }
    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("group/compose_and_sign");
    for size in SIZES {
        let items = members(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| compose(items).build(1_000).unwrap());
        });
    }
    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let signed = compose(&members(16)).build(1_000).unwrap();
    let bytes = encode_group(&signed);

    c.bench_function("group/encode_16", |b| {
        b.iter(|| encode_group(&signed));
    });
    c.bench_function("group/decode_16", |b| {
        b.iter(|| decode_group(&bytes).unwrap());
    });
}

criterion_group!(benches, bench_group_id, bench_compose, bench_wire);
criterion_main!(benches);
