//! The immutable value objects kept in the object database.
//!
//! Every object is identified by the domain-separated hash of its canonical
//! encoding (see [`crate::codec`]). Ids are computed once at construction and
//! never change; "mutation" always means building new objects.

mod commit;
mod feature;
mod node;
mod tree;

pub use commit::{Person, RevCommit, RevTag};
pub use feature::{AttributeDescriptor, RevFeature, RevFeatureType, Value, ValueType};
pub use node::{append_child, parent_path, Bucket, Node, NodeKind, NodeRef};
pub use tree::{RevTree, TreeBody, BUCKET_COUNT};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_crypto::ContentHasher;
use tessera_types::ObjectId;

/// The kind of a stored object. The discriminant is the tag byte that
/// prefixes every canonical encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Tree,
    Feature,
    FeatureType,
    Commit,
    Tag,
}

impl ObjectKind {
    /// Tag byte written in front of the payload.
    pub fn tag_byte(&self) -> u8 {
        match self {
            Self::Tree => 1,
            Self::Feature => 2,
            Self::FeatureType => 3,
            Self::Commit => 4,
            Self::Tag => 5,
        }
    }

    /// Parse a tag byte.
    pub fn from_tag_byte(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Tree),
            2 => Some(Self::Feature),
            3 => Some(Self::FeatureType),
            4 => Some(Self::Commit),
            5 => Some(Self::Tag),
            _ => None,
        }
    }

    /// The domain-separated hasher for this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Tree => &ContentHasher::TREE,
            Self::Feature => &ContentHasher::FEATURE,
            Self::FeatureType => &ContentHasher::FEATURE_TYPE,
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tag => &ContentHasher::TAG,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree => write!(f, "tree"),
            Self::Feature => write!(f, "feature"),
            Self::FeatureType => write!(f, "featuretype"),
            Self::Commit => write!(f, "commit"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// Implemented by every concrete object type; ties a type to its kind tag
/// so the codec can encode and decode it generically.
pub trait Revision: Serialize + DeserializeOwned + Clone {
    const KIND: ObjectKind;

    /// The content-addressed id of this object.
    fn id(&self) -> ObjectId;

    #[doc(hidden)]
    fn set_id(&mut self, id: ObjectId);

    /// Wrap into the closed object enum.
    fn into_object(self) -> RevObject;

    /// Unwrap from the closed object enum, if the kind matches.
    fn from_object(object: RevObject) -> Option<Self>;
}

/// Any stored object.
#[derive(Clone, Debug, PartialEq)]
pub enum RevObject {
    Tree(RevTree),
    Feature(RevFeature),
    FeatureType(RevFeatureType),
    Commit(RevCommit),
    Tag(RevTag),
}

impl RevObject {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Tree(o) => o.id(),
            Self::Feature(o) => o.id(),
            Self::FeatureType(o) => o.id(),
            Self::Commit(o) => o.id(),
            Self::Tag(o) => o.id(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Tree(_) => ObjectKind::Tree,
            Self::Feature(_) => ObjectKind::Feature,
            Self::FeatureType(_) => ObjectKind::FeatureType,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }
}

macro_rules! impl_revision {
    ($ty:ty, $kind:ident) => {
        impl Revision for $ty {
            const KIND: ObjectKind = ObjectKind::$kind;

            fn id(&self) -> ObjectId {
                self.id
            }

            fn set_id(&mut self, id: ObjectId) {
                self.id = id;
            }

            fn into_object(self) -> RevObject {
                RevObject::$kind(self)
            }

            fn from_object(object: RevObject) -> Option<Self> {
                match object {
                    RevObject::$kind(o) => Some(o),
                    _ => None,
                }
            }
        }

        impl From<$ty> for RevObject {
            fn from(value: $ty) -> Self {
                RevObject::$kind(value)
            }
        }
    };
}

impl_revision!(RevTree, Tree);
impl_revision!(RevFeature, Feature);
impl_revision!(RevFeatureType, FeatureType);
impl_revision!(RevCommit, Commit);
impl_revision!(RevTag, Tag);
