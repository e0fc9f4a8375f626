use crate::database::bind::placeholder;

/// Hands out positional placeholder names that are unique within one script.
///
/// A new sequence is created for every chunk assembly, including every retry, so numbering
/// always starts again at `@p1`.
#[derive(Debug, Default)]
pub struct PlaceholderSequence {
    last: u64,
}

impl PlaceholderSequence {
    pub fn new() -> Self {
        PlaceholderSequence { last: 0 }
    }

    pub fn next_placeholder(&mut self) -> String {
        self.last += 1;
        placeholder(self.last)
    }

    /// Number of placeholders handed out so far.
    pub fn allocated(&self) -> u64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let mut sequence = PlaceholderSequence::new();

        assert_eq!(sequence.next_placeholder(), "@p1");
        assert_eq!(sequence.next_placeholder(), "@p2");
        assert_eq!(sequence.allocated(), 2);

        assert_eq!(PlaceholderSequence::new().next_placeholder(), "@p1");
    }
}
