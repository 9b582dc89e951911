#![no_main]

use aquamesh_protocol::{
    AnyHeader, CommonHeader, Header, HeaderKind, Packet, RelayControlHeader,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Every header kind must reject or accept arbitrary bytes without panicking,
    // and anything accepted must re-encode to the same number of bytes
    for kind in HeaderKind::ALL {
        if let Ok(header) = AnyHeader::decode(kind, data) {
            let bytes = header.to_bytes();
            assert_eq!(bytes.len(), kind.serialized_size());
            let _ = AnyHeader::decode(kind, &bytes);
        }
    }

    // Walk a received frame the way the router does
    if let Ok(mut packet) = Packet::from_wire(data) {
        if packet.pop_header::<CommonHeader>().is_ok() {
            let _ = packet.pop_header::<RelayControlHeader>();
        }
        let _ = packet.payload();
    }

    let _ = CommonHeader::from_bytes(data);
});
