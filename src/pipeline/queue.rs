//! Work queue between the coordinator and the fit workers.

use crate::candidate::BoundedWindow;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Element of the candidate queue.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueItem {
    Window(BoundedWindow),
    /// End of stream. A worker that pops it pushes it back before exiting so
    /// every other worker sees it too.
    Sentinel,
}

/// Multi-producer multi-consumer FIFO of windows.
///
/// The queue owns both channel ends, so the channel never disconnects while
/// a queue value is alive: sends cannot fail and `pop` always yields an item.
#[derive(Clone, Debug)]
pub struct CandidateQueue {
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Appends a window.
    pub fn push(&self, window: BoundedWindow) {
        let _ = self.sender.send(QueueItem::Window(window));
    }

    /// Appends the end-of-stream marker.
    pub fn push_sentinel(&self) {
        let _ = self.sender.send(QueueItem::Sentinel);
    }

    /// Blocks until an item is available.
    pub fn pop(&self) -> Option<QueueItem> {
        self.receiver.recv().ok()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{CandidateQueue, QueueItem};
    use crate::candidate::{BoundedWindow, Candidate};
    use crate::image::PlaneIndex;

    fn window(index: usize) -> BoundedWindow {
        let cand = Candidate {
            x: 5,
            y: 5,
            value: 1.0,
            plane: PlaneIndex::default(),
            index,
        };
        BoundedWindow::new(cand, 5, 5, 1, vec![0.0; 9]).unwrap()
    }

    #[test]
    fn fifo_with_sentinel_last() {
        let queue = CandidateQueue::new();
        queue.push(window(0));
        queue.push(window(1));
        queue.push_sentinel();
        assert_eq!(queue.len(), 3);
        let indices: Vec<_> = std::iter::from_fn(|| match queue.pop() {
            Some(QueueItem::Window(w)) => Some(w.candidate().index),
            _ => None,
        })
        .collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn sentinel_reaches_every_consumer() {
        let queue = CandidateQueue::new();
        queue.push_sentinel();
        let exited = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| loop {
                        if let Some(QueueItem::Sentinel) = queue.pop() {
                            queue.push_sentinel();
                            return true;
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&done| done)
                .count()
        });
        assert_eq!(exited, 4);
        assert_eq!(queue.len(), 1);
    }
}
