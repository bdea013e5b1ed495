use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use line_tree::LineTree;
use std::hint::black_box;

fn lines(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("line number {n}")).collect()
}

fn joined(count: usize) -> String {
    let mut text = lines(count).join("\n");
    text.push('\n');
    text
}

fn bench_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("creation");

    for size in [100, 1_000, 10_000, 100_000].iter() {
        let source = lines(*size);
        let text = joined(*size);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("line_tree", size), size, |b, _| {
            b.iter(|| {
                let tree = LineTree::from_lines(black_box(source.iter().cloned()));
                black_box(tree);
            })
        });

        group.bench_with_input(BenchmarkId::new("ropey", size), size, |b, _| {
            b.iter(|| {
                let ropey = ropey::Rope::from_str(black_box(text.as_str()));
                black_box(ropey)
            });
        });
    }
    group.finish();
}

fn bench_insert_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_line");

    for size in [1_000, 10_000, 100_000].iter() {
        let source = lines(*size);
        let text = joined(*size);

        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("line_tree_beginning", size), size, |b, _| {
            b.iter_batched(
                || LineTree::from_lines(source.iter().cloned()),
                |mut tree| {
                    tree.insert(black_box(0), ["INSERTED".to_string()]).unwrap();
                    black_box(tree);
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("ropey_beginning", size), size, |b, _| {
            b.iter_batched(
                || ropey::Rope::from_str(text.as_str()),
                |mut ropey| {
                    ropey.insert(black_box(0), black_box("INSERTED\n"));
                    black_box(ropey);
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("line_tree_middle", size), size, |b, _| {
            b.iter_batched(
                || LineTree::from_lines(source.iter().cloned()),
                |mut tree| {
                    tree.insert(black_box(size / 2), ["INSERTED".to_string()])
                        .unwrap();
                    black_box(tree);
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("ropey_middle", size), size, |b, _| {
            b.iter_batched(
                || ropey::Rope::from_str(text.as_str()),
                |mut ropey| {
                    let at = ropey.line_to_char(size / 2);
                    ropey.insert(black_box(at), black_box("INSERTED\n"));
                    black_box(ropey);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_remove_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_lines");

    for size in [1_000, 10_000, 100_000].iter() {
        let source = lines(*size);
        let text = joined(*size);
        let count = size / 10;

        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("line_tree", size), size, |b, _| {
            b.iter_batched(
                || LineTree::from_lines(source.iter().cloned()),
                |mut tree| {
                    let removed = tree.remove(black_box(size / 2), black_box(count)).unwrap();
                    black_box(removed);
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("ropey", size), size, |b, _| {
            b.iter_batched(
                || ropey::Rope::from_str(text.as_str()),
                |mut ropey| {
                    let start = ropey.line_to_char(size / 2);
                    let end = ropey.line_to_char(size / 2 + count);
                    ropey.remove(black_box(start..end));
                    black_box(ropey);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_line_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_lookup");

    for size in [1_000, 10_000, 100_000].iter() {
        let tree = LineTree::from_lines(lines(*size));
        let ropey = ropey::Rope::from_str(&joined(*size));
        let handle = tree.id_at(size * 3 / 4).unwrap();

        group.bench_with_input(BenchmarkId::new("line_tree_get", size), size, |b, _| {
            b.iter(|| black_box(tree.get(black_box(size / 3)).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("ropey_line", size), size, |b, _| {
            b.iter(|| black_box(ropey.line(black_box(size / 3))))
        });

        group.bench_with_input(BenchmarkId::new("line_tree_line_number_of", size), size, |b, _| {
            b.iter(|| black_box(tree.line_number_of(black_box(handle))))
        });

        group.bench_with_input(BenchmarkId::new("ropey_char_to_line", size), size, |b, _| {
            let at = ropey.line_to_char(size * 3 / 4);
            b.iter(|| black_box(ropey.char_to_line(black_box(at))))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_creation,
    bench_insert_lines,
    bench_remove_lines,
    bench_line_lookup
);
criterion_main!(benches);
