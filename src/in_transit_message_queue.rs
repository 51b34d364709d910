/**
 * @file in_transit_message_queue.rs
 * @author Byeonggil Jun
 * @author Edward A. Lee
 * @author Chanhee Lee
 * @copyright (c) 2023-2024, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 *
 * @brief In-transit message queue that uses a priority queue with tags for sorting.
 */
use std::cmp::Reverse;

use priority_queue::PriorityQueue;

use crate::tag::Tag;

/**
 * Tags of messages the RTI has forwarded to a federate that the federate has
 * not yet reported as completed. The smallest tag is at the head.
 */
#[derive(Debug)]
pub struct InTransitMessageQueue {
    queue: PriorityQueue<Tag, Reverse<Tag>>,
}

impl InTransitMessageQueue {
    pub fn new() -> InTransitMessageQueue {
        InTransitMessageQueue {
            queue: PriorityQueue::with_capacity(10),
        }
    }

    /** Record `t` unless a message with the same tag is already recorded. */
    pub fn insert_if_no_match_tag(&mut self, t: Tag) {
        if self.queue.get(&t).is_none() {
            self.queue.push(t, Reverse(t));
        }
    }

    /** Drop every record with a tag less than or equal to `t`. */
    pub fn remove_up_to(&mut self, t: Tag) {
        while let Some((head, _)) = self.queue.peek() {
            if *head > t {
                break;
            }
            self.queue.pop();
        }
    }

    /** Smallest recorded tag, or FOREVER when nothing is in transit. */
    pub fn peek_tag(&self) -> Tag {
        match self.queue.peek() {
            Some((tag, _)) => *tag,
            None => Tag::forever_tag(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;

    #[test]
    fn test_peek_tag_returns_minimum() {
        let mut q = InTransitMessageQueue::new();
        assert_eq!(Tag::forever_tag(), q.peek_tag());
        q.insert_if_no_match_tag(Tag::new(20, 0));
        q.insert_if_no_match_tag(Tag::new(10, 2));
        q.insert_if_no_match_tag(Tag::new(10, 1));
        q.insert_if_no_match_tag(Tag::new(10, 1));
        assert_eq!(3, q.len());
        assert_eq!(Tag::new(10, 1), q.peek_tag());
    }

    #[test]
    fn test_remove_up_to() {
        let mut q = InTransitMessageQueue::new();
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            q.insert_if_no_match_tag(Tag::new(rng.gen_range(0..100), rng.gen_range(0..3)));
        }
        q.remove_up_to(Tag::new(49, u32::MAX));
        assert!(q.is_empty() || q.peek_tag() >= Tag::new(50, 0));
        q.remove_up_to(Tag::forever_tag());
        assert!(q.is_empty());
    }
}
