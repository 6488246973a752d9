use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gmapack::archive::Archive;
use gmapack::codec::{decode, encode};
use gmapack::differ::StreamDiffer;
use gmapack::manifest::AddonType;
use std::io::Cursor;

fn addon(files: usize, size: usize) -> Archive {
    let mut a = Archive::new();
    a.set_title("Bench");
    a.set_addon_type(AddonType::Model);
    for i in 0..files {
        a.add_entry(&format!("models/bench/prop_{i}.mdl"), vec![(i % 251) as u8; size]).unwrap();
    }
    a
}

fn bench_codec(c: &mut Criterion) {
    let a = addon(64, 16 * 1024);
    let image = encode(&a).unwrap();

    c.bench_function("encode_1mb", |b| b.iter(|| encode(black_box(&a)).unwrap()));
    c.bench_function("decode_1mb", |b| b.iter(|| decode(black_box(&image)).unwrap()));
}

fn bench_reconcile(c: &mut Criterion) {
    let before = addon(64, 16 * 1024);
    let old = encode(&before).unwrap();

    let mut retitled = before.clone();
    retitled.set_title("Bencj");
    let retitled = encode(&retitled).unwrap();

    let mut grown = before;
    grown.add_entry("models/bench/zz_extra.mdl", vec![7u8; 16 * 1024]).unwrap();
    let grown = encode(&grown).unwrap();

    c.bench_function("reconcile_identical_1mb", |b| {
        b.iter(|| {
            let mut d = StreamDiffer::new(Cursor::new(old.clone()));
            d.reconcile(black_box(&old)).unwrap()
        })
    });

    c.bench_function("reconcile_title_edit_1mb", |b| {
        b.iter(|| {
            let mut d = StreamDiffer::new(Cursor::new(old.clone()));
            d.reconcile(black_box(&retitled)).unwrap()
        })
    });

    c.bench_function("reconcile_append_entry_1mb", |b| {
        b.iter(|| {
            let mut d = StreamDiffer::new(Cursor::new(old.clone()));
            d.reconcile(black_box(&grown)).unwrap()
        })
    });
}

criterion_group!(benches, bench_codec, bench_reconcile);
criterion_main!(benches);
