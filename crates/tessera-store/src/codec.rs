//! Canonical object encoding and the compression applied inside backends.
//!
//! Canonical form: `[1 byte kind tag][bincode payload]`. The object id is
//! the domain-separated hash of exactly these bytes. Backends store the
//! canonical bytes zstd-compressed; compression never affects ids.

use tessera_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{
    ObjectKind, RevCommit, RevFeature, RevFeatureType, RevObject, RevTag, RevTree, Revision,
};

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Encode an object into its canonical bytes.
pub fn encode<T: Revision>(object: &T) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(object).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(T::KIND.tag_byte());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encode any object into its canonical bytes.
pub fn encode_object(object: &RevObject) -> StoreResult<Vec<u8>> {
    match object {
        RevObject::Tree(o) => encode(o),
        RevObject::Feature(o) => encode(o),
        RevObject::FeatureType(o) => encode(o),
        RevObject::Commit(o) => encode(o),
        RevObject::Tag(o) => encode(o),
    }
}

/// Compute the id an object would be stored under.
pub fn compute_id<T: Revision>(object: &T) -> StoreResult<ObjectId> {
    let bytes = encode(object)?;
    Ok(T::KIND.hasher().hash(&bytes))
}

/// Decode canonical bytes, verifying they hash to `expected`.
pub fn decode(data: &[u8], expected: &ObjectId) -> StoreResult<RevObject> {
    decode_with(data, expected, true)
}

/// Decode canonical bytes read under `expected`. With `verify` unset the
/// content hash is not recomputed and the object simply takes `expected` as
/// its id.
pub fn decode_with(data: &[u8], expected: &ObjectId, verify: bool) -> StoreResult<RevObject> {
    let (&tag, payload) = data.split_first().ok_or_else(|| StoreError::CorruptObject {
        id: *expected,
        reason: "empty encoding".into(),
    })?;
    let kind = ObjectKind::from_tag_byte(tag).ok_or_else(|| StoreError::CorruptObject {
        id: *expected,
        reason: format!("unknown object tag {tag}"),
    })?;

    let computed = if verify {
        let computed = kind.hasher().hash(data);
        if computed != *expected {
            return Err(StoreError::HashMismatch {
                id: *expected,
                computed,
            });
        }
        computed
    } else {
        *expected
    };

    let object = match kind {
        ObjectKind::Tree => {
            let tree: RevTree = decode_payload(payload, computed)?;
            tree.check_consistency()
                .map_err(|reason| StoreError::CorruptObject { id: computed, reason })?;
            RevObject::Tree(tree)
        }
        ObjectKind::Feature => RevObject::Feature(decode_payload::<RevFeature>(payload, computed)?),
        ObjectKind::FeatureType => {
            RevObject::FeatureType(decode_payload::<RevFeatureType>(payload, computed)?)
        }
        ObjectKind::Commit => RevObject::Commit(decode_payload::<RevCommit>(payload, computed)?),
        ObjectKind::Tag => RevObject::Tag(decode_payload::<RevTag>(payload, computed)?),
    };
    Ok(object)
}

/// Decode canonical bytes into a specific object type.
pub fn decode_as<T: Revision>(data: &[u8], expected: &ObjectId) -> StoreResult<T> {
    let object = decode(data, expected)?;
    let kind = object.kind();
    T::from_object(object).ok_or_else(|| StoreError::CorruptObject {
        id: *expected,
        reason: format!("expected {}, got {kind}", T::KIND),
    })
}

fn decode_payload<T: Revision>(payload: &[u8], id: ObjectId) -> StoreResult<T> {
    let mut object: T = bincode::deserialize(payload).map_err(|e| StoreError::CorruptObject {
        id,
        reason: e.to_string(),
    })?;
    object.set_id(id);
    Ok(object)
}

/// Compress canonical bytes for storage.
pub fn compress(data: &[u8], level: i32) -> StoreResult<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| StoreError::Compression(e.to_string()))
}

/// Reverse of [`compress`].
pub fn decompress(data: &[u8], id: &ObjectId) -> StoreResult<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| StoreError::CorruptObject {
        id: *id,
        reason: format!("decompression failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{AttributeDescriptor, Node, Person, Value, ValueType};
    use tessera_types::{Crs, Envelope};

    fn sample_tree() -> RevTree {
        RevTree::leaf(
            vec![
                Node::record("1", ObjectId::from_bytes(b"f1"))
                    .with_bounds(Envelope::new(0.0, 0.0, 1.0, 1.0).unwrap()),
                Node::record("2", ObjectId::from_bytes(b"f2")),
            ],
            vec![Node::tree("sub", RevTree::empty_id()).with_metadata(ObjectId::from_bytes(b"md"))],
        )
        .unwrap()
    }

    #[test]
    fn tree_decodes_to_the_same_object() {
        let tree = sample_tree();
        let bytes = encode(&tree).unwrap();
        assert_eq!(bytes[0], ObjectKind::Tree.tag_byte());
        let decoded: RevTree = decode_as(&bytes, &tree.id()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn every_kind_decodes_with_its_id() {
        let person = Person::new("Bob", "bob@example.org", 42);
        let feature = RevFeature::new(vec![Some(Value::String("x".into())), None]).unwrap();
        let schema = RevFeatureType::new(
            "t",
            vec![AttributeDescriptor::new("a", ValueType::String, true)],
            Some(Crs::WebMercator),
        )
        .unwrap();
        let commit =
            RevCommit::new(RevTree::empty_id(), vec![], person.clone(), person.clone(), "m")
                .unwrap();
        let tag = RevTag::new("v1", commit.id(), "tag", person).unwrap();

        let objects: Vec<RevObject> = vec![
            sample_tree().into(),
            feature.into(),
            schema.into(),
            commit.into(),
            tag.into(),
        ];
        for object in objects {
            let bytes = encode_object(&object).unwrap();
            let decoded = decode(&bytes, &object.id()).unwrap();
            assert_eq!(decoded, object);
        }
    }

    #[test]
    fn wrong_expected_id_is_a_hash_mismatch() {
        let tree = sample_tree();
        let bytes = encode(&tree).unwrap();
        let wrong = ObjectId::from_bytes(b"other");
        let err = decode(&bytes, &wrong).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { id, computed } if id == wrong && computed == tree.id()));
    }

    #[test]
    fn unverified_decode_trusts_the_key() {
        let tree = sample_tree();
        let bytes = encode(&tree).unwrap();
        let key = ObjectId::from_bytes(b"key");
        let decoded = decode_with(&bytes, &key, false).unwrap();
        assert_eq!(decoded.id(), key);
    }

    #[test]
    fn flipped_byte_is_detected() {
        let tree = sample_tree();
        let mut bytes = encode(&tree).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(decode(&bytes, &tree.id()).is_err());
    }

    #[test]
    fn unknown_tag_and_empty_input_are_corrupt() {
        let id = ObjectId::from_bytes(b"x");
        assert!(matches!(
            decode(&[], &id).unwrap_err(),
            StoreError::CorruptObject { .. }
        ));
        assert!(matches!(
            decode(&[99, 1, 2], &id).unwrap_err(),
            StoreError::CorruptObject { .. }
        ));
    }

    #[test]
    fn decode_as_rejects_other_kinds() {
        let feature = RevFeature::new(vec![Some(Value::Bool(true))]).unwrap();
        let bytes = encode(&feature).unwrap();
        let err = decode_as::<RevTree>(&bytes, &feature.id()).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn compression_roundtrip() {
        let data = vec![7u8; 10_000];
        let id = ObjectId::from_bytes(&data);
        let packed = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, &id).unwrap(), data);
        assert!(decompress(b"not zstd", &id).is_err());
    }
}
