use bytes::Bytes;
use chanstore_chunks::{join, split};

fn main() {
    divan::main();
}

fn make_data(size: usize) -> Bytes {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect::<Vec<u8>>()
        .into()
}

#[divan::bench(args = [1024, 1048576, 26214400])]
fn split_at_ten_mib(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| split(divan::black_box(data.clone()), 10 * 1024 * 1024));
}

#[divan::bench(args = [1024, 1048576, 26214400])]
fn join_parts(bencher: divan::Bencher, size: usize) {
    let parts = split(make_data(size), 64 * 1024).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| join(divan::black_box(&parts)));
}
