use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nvpk::entry::{HashEntry, OptionalDataEntry, PathEntry};
use nvpk::perf::encode_entries;
use nvpk::{FileEntry, FileIndex, HashPurpose, HashType, OptionalDataType, PackageReader, PackageWriter};
use std::io::Cursor;

fn sample_entry(id: u64) -> FileEntry {
    let mut e = FileEntry::new(id);
    e.add_path(PathEntry::new(format!("assets/level_{id:04}/mesh.bin")));
    e.add_path(PathEntry::new(format!("shared/{id:04}.bin")));
    e.add_hash(HashEntry::new(HashType::Blake3, HashPurpose::ContentVerification, vec![0xAB; 32]));
    e.add_hash(HashEntry::new(HashType::Xxh3, HashPurpose::FastLookup, vec![0xCD; 8]));
    e.add_optional_data(OptionalDataEntry::new(OptionalDataType::Tags, b"lod=0;kind=mesh".to_vec()));
    e
}

fn bench_file_entry(c: &mut Criterion) {
    let mut entry = sample_entry(1);
    let mut encoded = Vec::new();
    entry.write(&mut encoded).unwrap();

    c.bench_function("file_entry_encode", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(entry.size());
            entry.write(black_box(&mut out)).unwrap();
            out
        })
    });
    c.bench_function("file_entry_decode", |b| {
        b.iter(|| FileEntry::read(black_box(encoded.as_slice())).unwrap())
    });
}

fn bench_index(c: &mut Criterion) {
    let mut index = FileIndex::new();
    for id in 1..=10_000u64 {
        index.push(id, id * 512);
    }
    let mut encoded = Vec::new();
    index.write(&mut encoded).unwrap();

    c.bench_function("index_decode_10k", |b| {
        b.iter(|| FileIndex::read(black_box(encoded.as_slice())).unwrap())
    });
    c.bench_function("index_validate_10k", |b| b.iter(|| black_box(&index).validate().unwrap()));
}

fn bench_batch_encode(c: &mut Criterion) {
    let batch: Vec<FileEntry> = (1..=1_000).map(sample_entry).collect();
    c.bench_function("encode_entries_1k", |b| {
        b.iter(|| {
            let mut entries = batch.clone();
            encode_entries(black_box(&mut entries)).unwrap()
        })
    });
}

fn bench_package(c: &mut Criterion) {
    let data = vec![42u8; 64 * 1024];

    c.bench_function("package_write_read_100", |b| {
        b.iter(|| {
            let mut writer = PackageWriter::new(Cursor::new(Vec::new())).unwrap();
            for id in 1..=100 {
                let mut e = sample_entry(id);
                e.set_checksums(&data, &data);
                writer.add_file(e, black_box(&data)).unwrap();
            }
            writer.finalize().unwrap();
            let bytes = writer.into_inner().into_inner();

            let mut reader = PackageReader::open(Cursor::new(bytes)).unwrap();
            reader.read_file_data(50).unwrap()
        })
    });
}

criterion_group!(benches, bench_file_entry, bench_index, bench_batch_encode, bench_package);
criterion_main!(benches);
