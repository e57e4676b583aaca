use serde::{Deserialize, Serialize};
use tessera_types::ObjectId;

use crate::codec;
use crate::error::StoreResult;

/// Identity and time of an author, committer or tagger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Offset from UTC in minutes.
    pub tz_offset_min: i32,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp_ms,
            tz_offset_min: 0,
        }
    }
}

/// A commit: a root tree plus its ancestry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevCommit {
    #[serde(skip)]
    pub(crate) id: ObjectId,
    tree_id: ObjectId,
    parent_ids: Vec<ObjectId>,
    author: Person,
    committer: Person,
    message: String,
}

impl RevCommit {
    pub fn new(
        tree_id: ObjectId,
        parent_ids: Vec<ObjectId>,
        author: Person,
        committer: Person,
        message: impl Into<String>,
    ) -> StoreResult<Self> {
        let mut commit = Self {
            id: ObjectId::NULL,
            tree_id,
            parent_ids,
            author,
            committer,
            message: message.into(),
        };
        commit.id = codec::compute_id(&commit)?;
        Ok(commit)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn tree_id(&self) -> ObjectId {
        self.tree_id
    }

    pub fn parent_ids(&self) -> &[ObjectId] {
        &self.parent_ids
    }

    /// The first parent, if any.
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent_ids.first().copied()
    }

    pub fn is_initial(&self) -> bool {
        self.parent_ids.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    pub fn author(&self) -> &Person {
        &self.author
    }

    pub fn committer(&self) -> &Person {
        &self.committer
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An annotated tag pointing at a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevTag {
    #[serde(skip)]
    pub(crate) id: ObjectId,
    name: String,
    commit_id: ObjectId,
    message: String,
    tagger: Person,
}

impl RevTag {
    pub fn new(
        name: impl Into<String>,
        commit_id: ObjectId,
        message: impl Into<String>,
        tagger: Person,
    ) -> StoreResult<Self> {
        let mut tag = Self {
            id: ObjectId::NULL,
            name: name.into(),
            commit_id,
            message: message.into(),
            tagger,
        };
        tag.id = codec::compute_id(&tag)?;
        Ok(tag)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit_id(&self) -> ObjectId {
        self.commit_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tagger(&self) -> &Person {
        &self.tagger
    }
}
