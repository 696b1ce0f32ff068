// Bucket membership list: a doubly linked list threaded through slot indices

use std::sync::atomic::{AtomicUsize, Ordering};

/// End-of-list marker
pub(crate) const NIL: usize = usize::MAX;

/// Intrusive prev/next links stored in every slot.
///
/// Links are only read or written while holding the lock of the bucket whose list the
/// slot currently belongs to; that lock orders the accesses, so relaxed atomics suffice.
pub(crate) struct Link {
    prev: AtomicUsize,
    next: AtomicUsize,
}

impl Link {
    pub(crate) const fn new() -> Self {
        Link {
            prev: AtomicUsize::new(NIL),
            next: AtomicUsize::new(NIL),
        }
    }

    #[inline]
    fn prev(&self) -> usize {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    fn next(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_prev(&self, index: usize) {
        self.prev.store(index, Ordering::Relaxed);
    }

    #[inline]
    fn set_next(&self, index: usize) {
        self.next.store(index, Ordering::Relaxed);
    }
}

/// Anything carrying a [`Link`]
pub(crate) trait Linked {
    fn link(&self) -> &Link;
}

impl Linked for Link {
    fn link(&self) -> &Link {
        self
    }
}

/// Head, tail and length of one bucket's list
pub(crate) struct BucketList {
    head: usize,
    tail: usize,
    length: usize,
}

impl BucketList {
    pub(crate) const fn new() -> Self {
        BucketList {
            head: NIL,
            tail: NIL,
            length: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.length
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Links `index` at the head of the list
    pub(crate) fn push_front<S: Linked>(&mut self, nodes: &[S], index: usize) {
        let link = nodes[index].link();
        link.set_prev(NIL);
        link.set_next(self.head);

        if self.head != NIL {
            nodes[self.head].link().set_prev(index);
        } else {
            self.tail = index;
        }

        self.head = index;
        self.length += 1;
    }

    /// Unlinks `index`, which must be a member of this list
    pub(crate) fn remove<S: Linked>(&mut self, nodes: &[S], index: usize) {
        let link = nodes[index].link();
        let prev = link.prev();
        let next = link.next();

        if prev != NIL {
            nodes[prev].link().set_next(next);
        } else {
            self.head = next;
        }

        if next != NIL {
            nodes[next].link().set_prev(prev);
        } else {
            self.tail = prev;
        }

        link.set_prev(NIL);
        link.set_next(NIL);
        self.length -= 1;
    }

    /// Iterates member indices from head to tail
    pub(crate) fn iter<'a, S: Linked>(&self, nodes: &'a [S]) -> Iter<'a, S> {
        Iter {
            nodes,
            current: self.head,
        }
    }

    pub(crate) fn contains<S: Linked>(&self, nodes: &[S], index: usize) -> bool {
        self.iter(nodes).any(|member| member == index)
    }
}

pub(crate) struct Iter<'a, S> {
    nodes: &'a [S],
    current: usize,
}

impl<'a, S: Linked> Iterator for Iter<'a, S> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.current == NIL {
            return None;
        }
        let index = self.current;
        self.current = self.nodes[index].link().next();
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<Link> {
        (0..n).map(|_| Link::new()).collect()
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let nodes = nodes(4);
        let mut list = BucketList::new();
        assert!(list.is_empty());

        list.push_front(&nodes, 2);
        list.push_front(&nodes, 0);
        list.push_front(&nodes, 3);

        assert_eq!(list.iter(&nodes).collect::<Vec<_>>(), vec![3, 0, 2]);
        assert_eq!(list.len(), 3);
        assert!(list.contains(&nodes, 0));
        assert!(!list.contains(&nodes, 1));
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let nodes = nodes(5);
        let mut list = BucketList::new();
        for i in 0..5 {
            list.push_front(&nodes, i);
        }

        list.remove(&nodes, 2);
        assert_eq!(list.iter(&nodes).collect::<Vec<_>>(), vec![4, 3, 1, 0]);

        list.remove(&nodes, 4);
        assert_eq!(list.iter(&nodes).collect::<Vec<_>>(), vec![3, 1, 0]);

        list.remove(&nodes, 0);
        assert_eq!(list.iter(&nodes).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(list.len(), 2);

        list.remove(&nodes, 3);
        list.remove(&nodes, 1);
        assert!(list.is_empty());
        assert_eq!(list.iter(&nodes).count(), 0);
    }

    #[test]
    fn test_move_between_lists() {
        let nodes = nodes(3);
        let mut from = BucketList::new();
        let mut to = BucketList::new();
        from.push_front(&nodes, 0);
        from.push_front(&nodes, 1);
        to.push_front(&nodes, 2);

        from.remove(&nodes, 1);
        to.push_front(&nodes, 1);

        assert_eq!(from.iter(&nodes).collect::<Vec<_>>(), vec![0]);
        assert_eq!(to.iter(&nodes).collect::<Vec<_>>(), vec![1, 2]);
    }
}
