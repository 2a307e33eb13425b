//! Minimal line replacement between two versions of a buffer.
//!
//! Only the differing middle section is rewritten so the editor keeps the
//! cursor, marks and undo history for untouched lines.

/// A contiguous range of lines to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// First replaced line (0-based, inclusive).
    pub start: usize,
    /// End of the replaced range (0-based, exclusive).
    pub end: usize,
    /// Lines that take the place of `start..end`.
    pub lines: Vec<String>,
}

impl Replacement {
    /// Apply the replacement to `input`.
    pub fn apply<S: AsRef<str>>(&self, input: &[S]) -> Vec<String> {
        let mut result: Vec<String> = input[..self.start]
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect();
        result.extend(self.lines.iter().cloned());
        result.extend(input[self.end..].iter().map(|l| l.as_ref().to_string()));
        result
    }
}

/// Compute the smallest single-range replacement turning `input` into
/// `output`, or `None` when they are identical.
pub fn minimal_replacement<A, B>(input: &[A], output: &[B]) -> Option<Replacement>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let head = input
        .iter()
        .zip(output.iter())
        .take_while(|(a, b)| a.as_ref() == b.as_ref())
        .count();

    if head == input.len() && head == output.len() {
        return None;
    }

    // The suffix may not reach back into the shared prefix of either side.
    let tail = input[head..]
        .iter()
        .rev()
        .zip(output[head..].iter().rev())
        .take_while(|(a, b)| a.as_ref() == b.as_ref())
        .count();

    Some(Replacement {
        start: head,
        end: input.len() - tail,
        lines: output[head..output.len() - tail]
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect(),
    })
}
