use std::{marker::PhantomData, ptr::NonNull};

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Every header the allocator writes into mapped memory is one of these.
/// The links live in front of the metadata so both [`List`] and [`Ring`]
/// can thread nodes without knowing what `T` is.
pub(crate) struct Node<T> {
    /// Pointer to the next node
    pub next: Link<Self>,
    /// Pointer to the previous node
    pub prev: Link<Self>,
    /// Element of the node
    pub data: T,
}

impl<T> Node<T> {
    /// Writes a detached node holding `data` at `addr`.
    ///
    /// It is very important for us that, because we are the actual memory
    /// allocator, we can not make allocations ourselves. Therefor, the caller
    /// gives us the exact place where the node has to live.
    ///
    /// **SAFETY**: `addr` must be valid for writes of a `Node<T>` and aligned for it.
    pub unsafe fn write(addr: NonNull<u8>, data: T) -> NonNull<Self> {
        let node = addr.cast::<Self>();

        unsafe {
            node.as_ptr().write(Node {
                next: None,
                prev: None,
                data,
            });
        }

        node
    }
}

/// Null-terminated list with O(1) append. Used for arenas, which are only
/// ever appended and walked.
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    tail: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Appends an already written `node` at the end of the list. The node
    /// becomes the head if the list was empty.
    ///
    /// **SAFETY**: `node` must be a valid, detached node that outlives the list.
    pub unsafe fn append(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            node.as_mut().next = None;
            node.as_mut().prev = self.tail;

            match self.tail {
                Some(mut tail) => tail.as_mut().next = Some(node),
                None => self.head = Some(node),
            }
        }

        self.tail = Some(node);
        self.len += 1;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }
        self.remaining -= 1;

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Cyclic doubly linked list. The ring has no sentinel: it is anchored at
/// the first node ever pushed, and the last node links back to it.
///
/// ```text
///        +------------------------------------------------+
///        v                                                |
///   +--------+    +--------+    +--------+    +--------+  |
///   | head   | -> |        | -> |        | -> |  last  | -+
///   +--------+    +--------+    +--------+    +--------+
/// ```
///
/// Keeping `prev` makes predecessor lookup O(1) instead of a walk
/// around the whole ring.
pub(crate) struct Ring<T> {
    head: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

impl<T> Ring<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Next node in the ring. A singleton ring is its own successor.
    #[inline]
    pub unsafe fn successor(&self, node: NonNull<Node<T>>) -> NonNull<Node<T>> {
        unsafe { node.as_ref().next.unwrap_or(node) }
    }

    /// Previous node in the ring. A singleton ring is its own predecessor.
    #[inline]
    pub unsafe fn predecessor(&self, node: NonNull<Node<T>>) -> NonNull<Node<T>> {
        unsafe { node.as_ref().prev.unwrap_or(node) }
    }

    /// Splices `node` in right before the head, which makes it the last
    /// node of the ring. On an empty ring `node` becomes the head.
    ///
    /// **SAFETY**: `node` must be a valid node that is not linked anywhere.
    pub unsafe fn push_back(&mut self, node: NonNull<Node<T>>) {
        match self.head {
            Some(head) => unsafe {
                let last = self.predecessor(head);
                self.insert_after(last, node);
            },
            None => unsafe {
                let mut node = node;
                node.as_mut().next = Some(node);
                node.as_mut().prev = Some(node);
                self.head = Some(node);
                self.len += 1;
            },
        }
    }

    /// Splices `node` in between `at` and its successor.
    ///
    /// **SAFETY**: `at` must belong to this ring and `node` must not be linked anywhere.
    pub unsafe fn insert_after(&mut self, mut at: NonNull<Node<T>>, mut node: NonNull<Node<T>>) {
        unsafe {
            let mut next = self.successor(at);

            node.as_mut().prev = Some(at);
            node.as_mut().next = Some(next);
            next.as_mut().prev = Some(node);
            at.as_mut().next = Some(node);
        }

        self.len += 1;
    }

    /// Takes `node` out of the ring. If `node` was the head, its successor
    /// anchors the ring from now on.
    ///
    /// **SAFETY**: `node` must belong to this ring.
    pub unsafe fn remove(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            if self.len == 1 {
                self.head = None;
            } else {
                let mut next = self.successor(node);
                let mut prev = self.predecessor(node);
                prev.as_mut().next = Some(next);
                next.as_mut().prev = Some(prev);

                if self.head == Some(node) {
                    self.head = Some(next);
                }
            }

            node.as_mut().next = None;
            node.as_mut().prev = None;
        }

        self.len -= 1;
    }

    /// Walks the ring once, starting at the head.
    pub fn iter(&self) -> RingIter<'_, T> {
        RingIter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

pub(crate) struct RingIter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for RingIter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }
        self.remaining -= 1;

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
