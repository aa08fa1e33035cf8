#![cfg(feature = "serde")]

use schema::{registry_hash, FieldCodec, FieldDef, FieldId, Registry, TypeDef, TypeKind};

#[test]
fn registry_survives_json() {
    let registry = Registry::builder()
        .state(
            TypeDef::new(TypeKind::new(1).unwrap())
                .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::ranged(0, 100)))
                .field(FieldDef::new(
                    FieldId::new(2).unwrap(),
                    FieldCodec::fixed_point(-1000, 1000, 10),
                )),
        )
        .command(
            TypeDef::new(TypeKind::new(1).unwrap())
                .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::bool())),
        )
        .build()
        .unwrap();

    let json = serde_json::to_string(&registry).unwrap();
    let decoded: Registry = serde_json::from_str(&json).unwrap();
    decoded.validate().unwrap();
    assert_eq!(decoded, registry);
    assert_eq!(registry_hash(&decoded), registry_hash(&registry));
}

#[test]
fn zero_ids_are_rejected_by_deserialize() {
    let err = serde_json::from_str::<FieldId>("0");
    assert!(err.is_err());
}
