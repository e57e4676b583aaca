use tessera_store::{Bucket, Node};

use crate::error::DiffResult;

/// Receives the events of a tree diff traversal.
///
/// `left` is the old side and `right` the new side; `None` means the entry
/// does not exist on that side. Every `tree` call is followed by exactly one
/// `end_tree` call with the same arguments, and every `bucket` call by one
/// `end_bucket`, whether or not the opening call returned `false`. Brackets
/// nest strictly.
///
/// Decorators implement this trait by wrapping another consumer. A
/// decorator that suppresses an opening call must also suppress the matching
/// closing call.
pub trait DiffConsumer {
    /// A pair of tree nodes with different contents. Return `false` to skip
    /// descending into them.
    fn tree(&mut self, _left: Option<&Node>, _right: Option<&Node>) -> DiffResult<bool> {
        Ok(true)
    }

    fn end_tree(&mut self, _left: Option<&Node>, _right: Option<&Node>) -> DiffResult<()> {
        Ok(())
    }

    /// A pair of buckets at `index` of the trees being compared, `depth`
    /// bucket levels below the tree node. Return `false` to skip them.
    fn bucket(
        &mut self,
        _index: u8,
        _depth: usize,
        _left: Option<&Bucket>,
        _right: Option<&Bucket>,
    ) -> DiffResult<bool> {
        Ok(true)
    }

    fn end_bucket(
        &mut self,
        _index: u8,
        _depth: usize,
        _left: Option<&Bucket>,
        _right: Option<&Bucket>,
    ) -> DiffResult<()> {
        Ok(())
    }

    /// A record that was added, removed or modified.
    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()>;
}

impl<C: DiffConsumer + ?Sized> DiffConsumer for &mut C {
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        (**self).tree(left, right)
    }

    fn end_tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        (**self).end_tree(left, right)
    }

    fn bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<bool> {
        (**self).bucket(index, depth, left, right)
    }

    fn end_bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<()> {
        (**self).end_bucket(index, depth, left, right)
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        (**self).feature(left, right)
    }
}

impl<C: DiffConsumer + ?Sized> DiffConsumer for Box<C> {
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        (**self).tree(left, right)
    }

    fn end_tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        (**self).end_tree(left, right)
    }

    fn bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<bool> {
        (**self).bucket(index, depth, left, right)
    }

    fn end_bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<()> {
        (**self).end_bucket(index, depth, left, right)
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        (**self).feature(left, right)
    }
}
