//! Bounded buffer of characters echoed back in display mode.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct CaptureLog {
    chars: VecDeque<char>,
    capacity: usize,
}

impl CaptureLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chars: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Appends `c`, dropping the oldest character when full.
    pub fn push(&mut self, c: char) {
        if self.chars.len() == self.capacity {
            self.chars.pop_front();
        }
        self.chars.push_back(c);
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contents(&self) -> String {
        self.chars.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_characters() {
        let mut log = CaptureLog::new(3);
        for c in "abcde".chars() {
            log.push(c);
        }
        assert_eq!(log.contents(), "cde");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn clear_empties() {
        let mut log = CaptureLog::new(8);
        log.push('x');
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.contents(), "");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut log = CaptureLog::new(0);
        log.push('a');
        log.push('b');
        assert_eq!(log.contents(), "b");
    }
}
