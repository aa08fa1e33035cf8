//! Deterministic registry hashing.

use blake3::Hasher;

use crate::{FieldCodec, Registry, TypeDef};

/// Digest of every layout in the registry, truncated to 64 bits.
///
/// Order-sensitive: registering the same types in a different order yields
/// a different hash. Packets encode kinds by registration index.
#[must_use]
pub fn registry_hash(registry: &Registry) -> u64 {
    let mut sink = Sink(Hasher::new());

    for role in [&registry.states, &registry.events] {
        sink.len(role.len());
        role.iter().for_each(|def| sink.layout(def));
    }
    match &registry.command {
        Some(def) => {
            sink.put(&[1]);
            sink.layout(def);
        }
        None => sink.put(&[0]),
    }

    let digest = sink.0.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Little-endian writes into the digest.
struct Sink(Hasher);

impl Sink {
    fn put(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn len(&mut self, len: usize) {
        self.put(&(len as u32).to_le_bytes());
    }

    fn layout(&mut self, def: &TypeDef) {
        self.put(&def.kind.get().to_le_bytes());
        self.len(def.fields.len());
        for field in &def.fields {
            self.put(&field.id.get().to_le_bytes());
            self.codec(field.codec);
        }
    }

    // Tag byte, then the parameters that change the encoded width.
    fn codec(&mut self, codec: FieldCodec) {
        match codec {
            FieldCodec::Bool => self.put(&[0]),
            FieldCodec::UInt { bits } => self.put(&[1, bits]),
            FieldCodec::SInt { bits } => self.put(&[2, bits]),
            FieldCodec::Ranged { min, max } => {
                self.put(&[3]);
                self.put(&min.to_le_bytes());
                self.put(&max.to_le_bytes());
            }
            FieldCodec::FixedPoint(fp) => {
                self.put(&[4]);
                self.put(&fp.min_q.to_le_bytes());
                self.put(&fp.max_q.to_le_bytes());
                self.put(&fp.scale.to_le_bytes());
            }
        }
    }
}
