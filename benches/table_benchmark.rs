use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use multitable::{Table, codec, impl_entry, impl_tuploid};
use std::hint::black_box;

struct User {
    id: u64,
    name: String,
    age: u32,
    active: bool,
}

impl_entry! {
    User {
        0 => id: u64 [EnforceUnique],
        1 => name: String,
        2 => age: u32,
        3 => active: bool,
    }
    default = 0;
}

impl_tuploid!(User { id, name, age, active });

fn user(i: u64) -> User {
    User {
        id: i,
        name: format!("user{}", i),
        age: (i % 100) as u32,
        active: i % 2 == 0,
    }
}

fn setup_populated_table(n: u64) -> Table<User> {
    let mut table = Table::new();
    for i in 0..n {
        table.insert(user(i)).unwrap();
    }
    table
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert");

    for n in [1000u64, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter(|| black_box(setup_populated_table(n)));
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lookup_Unique_Field");

    for n in [1000u64, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let table = setup_populated_table(n);
            b.iter(|| black_box(table.find::<0>(black_box(&(n / 2)))));
        });
    }
    group.finish();
}

fn bench_range_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("Range_Query");

    for n in [1000u64, 10000].iter() {
        let table = setup_populated_table(*n);

        group.bench_with_input(BenchmarkId::new("single_range", n), n, |b, _| {
            b.iter(|| black_box(table.range::<2>(40, 42).count()));
        });
        group.bench_with_input(BenchmarkId::new("intersection", n), n, |b, &n| {
            b.iter(|| {
                let query = table.range::<0>(0, n / 2) & table.range::<2>(40, 42);
                black_box(query.count())
            });
        });
        group.bench_with_input(BenchmarkId::new("union", n), n, |b, &n| {
            b.iter(|| {
                let query = table.range::<0>(0, n / 10) | table.range::<2>(40, 42);
                black_box(query.count())
            });
        });
        group.bench_with_input(BenchmarkId::new("filtered", n), n, |b, _| {
            b.iter(|| {
                let query = table.range::<2>(40, 60) & table.pred(|u| u.active);
                black_box(query.count())
            });
        });
    }
    group.finish();
}

fn bench_update_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Update_Performance");

    for n in [1000u64, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || setup_populated_table(n),
                |mut table| {
                    let ids = table.range::<3>(true, true).ids();
                    for id in ids {
                        table.update::<2>(id, 99).unwrap();
                    }
                    black_box(table);
                },
            );
        });
    }
    group.finish();
}

fn bench_delete_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Delete_Performance");

    for n in [1000u64, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || setup_populated_table(n),
                |mut table| {
                    let mut cursor = table.field_cursor::<2>();
                    while let Some(user) = table.current(&cursor) {
                        if user.age > 90 {
                            cursor = table.erase_at(cursor).unwrap();
                        } else {
                            table.advance(&mut cursor);
                        }
                    }
                    black_box(table);
                },
            );
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Codec");

    for n in [1000u64, 10000].iter() {
        let table = setup_populated_table(*n);
        let bytes = codec::to_bytes(&table).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", n), n, |b, _| {
            b.iter(|| black_box(codec::to_bytes(&table).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", n), n, |b, _| {
            b.iter(|| black_box(codec::from_bytes::<Table<User>>(&bytes).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_range_queries,
    bench_update_performance,
    bench_delete_performance,
    bench_codec
);
criterion_main!(benches);
