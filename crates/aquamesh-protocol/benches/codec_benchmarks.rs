use criterion::{black_box, criterion_group, criterion_main, Criterion};
use aquamesh_protocol::*;

fn sample_vbf() -> VectorForwardingHeader {
    let mut header = VectorForwardingHeader::new(VbfMessageType::Data, 1234);
    header.sender = NodeAddress::new(3);
    header.forwarder = NodeAddress::new(4);
    header.original_source = Position::new(120.5, 33.25, 900.125);
    header.range = 150.0;
    header.extra.target = Position::new(0.0, 0.0, 0.0);
    header
}

fn benchmark_vbf_encode(c: &mut Criterion) {
    let header = sample_vbf();

    c.bench_function("encode vbf header", |b| {
        b.iter(|| black_box(&header).to_bytes());
    });
}

fn benchmark_vbf_decode(c: &mut Criterion) {
    let bytes = sample_vbf().to_bytes();

    c.bench_function("decode vbf header", |b| {
        b.iter(|| VectorForwardingHeader::from_bytes(black_box(&bytes)).unwrap());
    });
}

fn benchmark_probe_reply_roundtrip(c: &mut Criterion) {
    let header = ProbeReplyHeader {
        source: NodeAddress::new(2),
        destination: NodeAddress::new(1),
        queue_depth: 3,
        residual_energy: 97.5,
        hop_count: 2,
        link_quality: 0.6375,
    };

    c.bench_function("probe reply roundtrip", |b| {
        b.iter(|| ProbeReplyHeader::from_bytes(&black_box(&header).to_bytes()).unwrap());
    });
}

fn benchmark_packet_stack(c: &mut Criterion) {
    let payload = vec![0x5A; 256];
    let common = CommonHeader::new(NodeAddress::new(1), NodeAddress::new(9), NodeAddress::new(2));
    let control = RelayControlHeader::new(PacketType::Data, NodeAddress::new(1), NodeAddress::new(9));

    c.bench_function("packet push/wire/pop", |b| {
        b.iter(|| {
            let mut packet = Packet::new(black_box(payload.clone())).unwrap();
            packet.push_header(&control);
            packet.push_header(&common);
            let mut received = Packet::from_wire(&packet.to_wire()).unwrap();
            received.pop_header::<CommonHeader>().unwrap();
            received.pop_header::<RelayControlHeader>().unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_vbf_encode,
    benchmark_vbf_decode,
    benchmark_probe_reply_roundtrip,
    benchmark_packet_stack
);
criterion_main!(benches);
