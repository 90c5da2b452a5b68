use chanstore_crypto::{Cipher, CipherKey};

fn main() {
    divan::main();
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 1048576, 10485760])]
fn bench_encrypt_payload(bencher: divan::Bencher, size: usize) {
    let cipher = Cipher::new(CipherKey::generate());
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| cipher.encrypt(divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 1048576, 10485760])]
fn bench_decrypt_payload(bencher: divan::Bencher, size: usize) {
    let cipher = Cipher::new(CipherKey::generate());
    let encrypted = cipher.encrypt(&make_data(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| cipher.decrypt(divan::black_box(&encrypted)).unwrap());
}
