use tessera_types::ObjectId;
use tracing::trace;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::listener::BulkOpListener;
use crate::object::{
    RevCommit, RevFeature, RevFeatureType, RevObject, RevTag, RevTree, Revision,
};

/// Content-addressed object database.
///
/// Backends implement the raw byte operations; typed access, codec
/// verification and bulk transfer are provided on top of them.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same id always maps to
///   bit-identical canonical bytes.
/// - `put_raw` is idempotent. Racing writers of one id converge on a single
///   stored copy and exactly one of them observes `true`.
/// - Concurrent reads are always safe.
/// - Reading an absent id through the typed API is [`StoreError::NotFound`];
///   dangling references are never skipped silently.
/// - Compression is internal: `read_raw` returns exactly the bytes handed
///   to `put_raw`.
pub trait ObjectDatabase: Send + Sync {
    /// Canonical bytes of an object, or `None` if it is absent.
    fn read_raw(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>>;

    /// Store canonical bytes under `id`. Returns `false` if the id was
    /// already present.
    fn put_raw(&self, id: &ObjectId, data: &[u8]) -> StoreResult<bool>;

    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// All stored ids whose hex form starts with `prefix`.
    fn lookup(&self, prefix: &str) -> StoreResult<Vec<ObjectId>>;

    /// Delete an object. Returns `true` if it existed.
    ///
    /// Intended for garbage collection only; deleting a referenced object
    /// corrupts every graph that points at it.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Whether decoded objects have their content hash recomputed.
    fn verifies_hashes(&self) -> bool {
        true
    }

    /// Canonical bytes of an object that must exist.
    fn get_raw(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.read_raw(id)?.ok_or(StoreError::NotFound(*id))
    }

    fn get_if_present(&self, id: &ObjectId) -> StoreResult<Option<RevObject>> {
        match self.read_raw(id)? {
            Some(data) => codec::decode_with(&data, id, self.verifies_hashes()).map(Some),
            None => Ok(None),
        }
    }

    fn get_object(&self, id: &ObjectId) -> StoreResult<RevObject> {
        let data = self.get_raw(id)?;
        codec::decode_with(&data, id, self.verifies_hashes())
    }

    /// Read a tree. The canonical empty tree is always available, whether or
    /// not it was ever stored.
    fn get_tree(&self, id: &ObjectId) -> StoreResult<RevTree> {
        if *id == RevTree::empty_id() {
            return Ok(RevTree::empty());
        }
        trace!(id = %id.short_hex(), "reading tree");
        get_typed(self, id)
    }

    fn get_feature(&self, id: &ObjectId) -> StoreResult<RevFeature> {
        get_typed(self, id)
    }

    fn get_feature_type(&self, id: &ObjectId) -> StoreResult<RevFeatureType> {
        get_typed(self, id)
    }

    fn get_commit(&self, id: &ObjectId) -> StoreResult<RevCommit> {
        get_typed(self, id)
    }

    fn get_tag(&self, id: &ObjectId) -> StoreResult<RevTag> {
        get_typed(self, id)
    }

    /// Store an object. Returns `false` if it was already present.
    fn put_object(&self, object: &RevObject) -> StoreResult<bool> {
        let id = object.id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let data = codec::encode_object(object)?;
        self.put_raw(&id, &data)
    }

    fn put_tree(&self, tree: &RevTree) -> StoreResult<bool> {
        put_typed(self, tree)
    }

    fn put_feature(&self, feature: &RevFeature) -> StoreResult<bool> {
        put_typed(self, feature)
    }

    fn put_feature_type(&self, feature_type: &RevFeatureType) -> StoreResult<bool> {
        put_typed(self, feature_type)
    }

    fn put_commit(&self, commit: &RevCommit) -> StoreResult<bool> {
        put_typed(self, commit)
    }

    fn put_tag(&self, tag: &RevTag) -> StoreResult<bool> {
        put_typed(self, tag)
    }

    /// Lazily read many objects. Absent ids are reported to
    /// `listener.not_found` and skipped; decode failures are yielded.
    fn get_all<'a>(
        &'a self,
        ids: Box<dyn Iterator<Item = ObjectId> + 'a>,
        listener: &'a dyn BulkOpListener,
    ) -> Box<dyn Iterator<Item = StoreResult<RevObject>> + 'a> {
        let verify = self.verifies_hashes();
        Box::new(ids.filter_map(move |id| match self.read_raw(&id) {
            Ok(Some(data)) => {
                listener.found(&id, data.len());
                Some(codec::decode_with(&data, &id, verify))
            }
            Ok(None) => {
                listener.not_found(&id);
                None
            }
            Err(e) => Some(Err(e)),
        }))
    }

    /// Store every object the iterator yields, notifying `listener` of each
    /// outcome. Stops at the first error.
    fn put_all(
        &self,
        objects: &mut dyn Iterator<Item = RevObject>,
        listener: &dyn BulkOpListener,
    ) -> StoreResult<()> {
        for object in objects {
            let id = object.id();
            if id.is_null() {
                return Err(StoreError::NullObjectId);
            }
            let data = codec::encode_object(&object)?;
            if self.put_raw(&id, &data)? {
                listener.inserted(&id, data.len());
            } else {
                listener.already_exists(&id);
            }
        }
        Ok(())
    }
}

fn get_typed<D, T>(db: &D, id: &ObjectId) -> StoreResult<T>
where
    D: ObjectDatabase + ?Sized,
    T: Revision,
{
    let object = db.get_object(id)?;
    let kind = object.kind();
    T::from_object(object).ok_or_else(|| StoreError::CorruptObject {
        id: *id,
        reason: format!("expected {}, found {kind}", T::KIND),
    })
}

fn put_typed<D, T>(db: &D, object: &T) -> StoreResult<bool>
where
    D: ObjectDatabase + ?Sized,
    T: Revision,
{
    let id = object.id();
    if id.is_null() {
        return Err(StoreError::NullObjectId);
    }
    let data = codec::encode(object)?;
    db.put_raw(&id, &data)
}

/// Normalise an abbreviated id: at least two hex digits, at most a full id.
pub(crate) fn normalize_prefix(prefix: &str) -> StoreResult<String> {
    let valid = prefix.len() >= 2
        && prefix.len() <= 2 * tessera_types::OBJECT_ID_LEN
        && prefix.bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(StoreError::InvalidPrefix(prefix.to_string()));
    }
    Ok(prefix.to_ascii_lowercase())
}
