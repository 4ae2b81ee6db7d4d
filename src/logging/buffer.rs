//! In-memory line buffer for the file logger
//!
//! Holds formatted lines until they are written to the destination file,
//! signalling when the configured line threshold is reached.

/// Ordered buffer of formatted log lines
#[derive(Debug)]
pub struct LineBuffer {
    /// Pending lines, each ending in a newline
    lines: Vec<String>,
    /// Number of lines that triggers a write
    threshold: usize,
}

impl LineBuffer {
    /// Create a buffer that reports full once `threshold` lines are pending
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            lines: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Push a line, returning true when the buffer has reached its threshold
    pub fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.is_full()
    }

    /// Check whether the pending line count has reached the threshold
    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.threshold
    }

    /// Take all pending lines in arrival order, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    /// Get the number of pending lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Discard pending lines
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
