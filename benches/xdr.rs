use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ortho_wire::xdr;

pub fn primitives(c: &mut Criterion) {
    c.bench_function("read_u32", |b| {
        let mut out = BytesMut::new();
        xdr::write_u32(&mut out, 0x1234_5678);
        let frozen = out.freeze();

        b.iter(|| {
            let mut cursor = &frozen[..];
            black_box(xdr::read_u32(&mut cursor).unwrap())
        })
    });

    c.bench_function("blob_round_trip_64_bytes", |b| {
        let payload = vec![0x42u8; 64];
        let mut out = BytesMut::new();
        xdr::write_blob(&mut out, &payload);
        let frozen = out.freeze();

        b.iter(|| {
            let mut cursor = &frozen[..];
            black_box(xdr::read_blob(&mut cursor, 4096).unwrap())
        })
    });

    c.bench_function("write_blob_64_bytes", |b| {
        let payload = vec![0x42u8; 64];
        b.iter(|| {
            let mut out = BytesMut::new();
            xdr::write_blob(&mut out, black_box(&payload));
            black_box(&out);
        })
    });

    c.bench_function("string_round_trip", |b| {
        let mut out = BytesMut::new();
        xdr::write_string(&mut out, "/export/home/mamont");
        let frozen = out.freeze();

        b.iter(|| {
            let mut cursor = &frozen[..];
            black_box(xdr::read_string(&mut cursor, 1024).unwrap())
        })
    });
}

pub fn fragment_framing(c: &mut Criterion) {
    use ortho_wire::rpc::framing::{FragmentDecoder, FragmentLimits};
    use tokio_util::codec::Decoder;

    c.bench_function("decode_single_fragment_4kib", |b| {
        let payload = vec![0xabu8; 4096];
        let mut framed = BytesMut::new();
        framed.extend_from_slice(&((1u32 << 31) | payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&payload);
        let template: Bytes = framed.freeze();

        b.iter(|| {
            let mut decoder = FragmentDecoder::new(FragmentLimits::default());
            let mut src = BytesMut::from(&template[..]);
            black_box(decoder.decode(&mut src).unwrap())
        })
    });
}

criterion_group!(benches, primitives, fragment_framing);
criterion_main!(benches);
