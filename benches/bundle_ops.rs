//! Benchmarks for list allocation, manifest sync and the close/open cycle

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use databundle::{sniff_bytes, Bundle, BundlePath, DirTree, Manifest, PortStore, VirtualTree};
use tempfile::TempDir;

fn populated_list(size: usize) -> (TempDir, DirTree, BundlePath) {
    let temp_dir = TempDir::new().unwrap();
    let mut tree = DirTree::new(temp_dir.path()).unwrap();
    let list = BundlePath::new("inputs/list").unwrap();
    {
        let mut ports = PortStore::new(&mut tree);
        ports.create_list(&list).unwrap();
        for i in 0..size {
            let item = ports.get_list_item(&list, i as u64);
            ports.set_value(&item, "x").unwrap();
        }
    }
    (temp_dir, tree, list)
}

fn benchmark_new_list_item(c: &mut Criterion) {
    let mut group = c.benchmark_group("new_list_item");

    for size in [10, 100, 1000].iter() {
        let (_dir, mut tree, list) = populated_list(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let ports = PortStore::new(&mut tree);
            b.iter(|| black_box(ports.new_list_item(&list).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_get_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_list");

    for size in [10, 100, 1000].iter() {
        let (_dir, mut tree, list) = populated_list(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let ports = PortStore::new(&mut tree);
            b.iter(|| black_box(ports.get_list(&list).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_manifest_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_sync");

    for size in [10, 100, 1000].iter() {
        let (_dir, tree, _list) = populated_list(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut manifest = Manifest::new();
                manifest.populate_from_bundle(&tree).unwrap();
                black_box(manifest.len())
            });
        });
    }

    group.finish();
}

fn benchmark_close_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("close_open");
    group.sample_size(20);

    for size in [1, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut bundle = Bundle::create().unwrap();
                for i in 0..size {
                    let path = BundlePath::new(&format!("inputs/in{}", i)).unwrap();
                    bundle.write(&path, &vec![i as u8; 4096]).unwrap();
                }
                let zip = bundle.close().unwrap();
                let reopened = Bundle::open(&zip).unwrap();
                black_box(reopened.manifest().len());
                drop(reopened);
                std::fs::remove_file(zip).ok();
            });
        });
    }

    group.finish();
}

fn benchmark_sniff(c: &mut Criterion) {
    let mut bundle = Bundle::create().unwrap();
    let zip = bundle.close().unwrap();
    let prefix = std::fs::read(&zip).unwrap();
    std::fs::remove_file(zip).ok();

    c.bench_function("sniff_bytes", |b| b.iter(|| black_box(sniff_bytes(&prefix))));
}

criterion_group!(
    benches,
    benchmark_new_list_item,
    benchmark_get_list,
    benchmark_manifest_sync,
    benchmark_close_open,
    benchmark_sniff
);
criterion_main!(benches);
