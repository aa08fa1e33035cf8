#![no_main]

use std::sync::{Arc, OnceLock};

use codec::{CodecLimits, PacketCodec};
use libfuzzer_sys::fuzz_target;
use schema::{FieldCodec, FieldDef, FieldId, Registry, TypeDef, TypeKind};

fn codec() -> &'static PacketCodec {
    static CODEC: OnceLock<PacketCodec> = OnceLock::new();
    CODEC.get_or_init(|| {
        let field = |id| FieldId::new(id).unwrap();
        let registry = Registry::builder()
            .state(
                TypeDef::new(TypeKind::new(1).unwrap())
                    .field(FieldDef::new(field(1), FieldCodec::bool()))
                    .field(FieldDef::new(field(2), FieldCodec::uint(12)))
                    .field(FieldDef::new(field(3), FieldCodec::fixed_point(-10_000, 10_000, 100))),
            )
            .event(
                TypeDef::new(TypeKind::new(1).unwrap())
                    .field(FieldDef::new(field(1), FieldCodec::sint(16))),
            )
            .command(
                TypeDef::new(TypeKind::new(1).unwrap())
                    .field(FieldDef::new(field(1), FieldCodec::uint(8))),
            )
            .build()
            .unwrap();
        PacketCodec::new(Arc::new(registry))
            .unwrap()
            .with_limits(wire::Limits::for_testing(), CodecLimits::for_testing())
    })
}

fuzz_target!(|data: &[u8]| {
    let codec = codec();
    if let Ok(packet) = codec.decode_server(data) {
        // whatever re-encodes must decode back to the same packet
        if let Ok(bytes) = codec.encode_server(&packet) {
            assert_eq!(codec.decode_server(&bytes).unwrap(), packet);
        }
    }
    if let Ok(packet) = codec.decode_client(data) {
        if let Ok(bytes) = codec.encode_client(&packet) {
            assert_eq!(codec.decode_client(&bytes).unwrap(), packet);
        }
    }
});
