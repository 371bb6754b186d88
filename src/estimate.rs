/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Optional figure-of-merit (FOM) outside estimates used to bias agenda
//! priority toward the goal item. Computing the estimate tensor itself is
//! an external collaborator's job (grammar/outside-estimate construction is
//! out of scope, spec §1); this module only evaluates a given tensor.

use std::collections::HashMap;

use crate::bits::SpanOps;
use crate::grammar::Label;

/// Log-space cutoff above which a candidate's `score` is dropped before
/// ever reaching the agenda, per spec §4.2/§9. Preserved verbatim from the
/// reference implementation.
pub const INF_DROP_THRESHOLD: f64 = 300.0;

/// Which outside-estimate shape `tensor` was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateKind {
    /// Indexed by `(label, left, right, 0)`.
    Sx,
    /// Indexed by `(label, length, left+right, gaps)`.
    SxLrGaps,
}

/// An outside-estimate tensor plus the indexing scheme to use with it.
///
/// Missing entries default to `0.0` (no bias) rather than `+inf`, since an
/// incomplete tensor should degrade to plain agenda-order search rather than
/// silently pruning everything it wasn't given a value for.
#[derive(Clone, Debug, Default)]
pub struct Estimates {
    pub kind: EstimateKind,
    tensor: HashMap<(Label, usize, usize, usize), f64>,
}

impl Default for EstimateKind {
    fn default() -> Self {
        EstimateKind::Sx
    }
}

impl Estimates {
    pub fn new(kind: EstimateKind) -> Self {
        Estimates { kind, tensor: HashMap::new() }
    }

    pub fn set(&mut self, label: Label, a: usize, b: usize, c: usize, value: f64) {
        self.tensor.insert((label, a, b, c), value);
    }

    /// `inside + outside[label, index(span)]` for the indexing scheme
    /// selected by `self.kind` (spec §4.2 "Optional FOM estimate").
    pub fn score<S: SpanOps>(&self, label: Label, span: &S, inside: f64, sent_len: usize) -> f64 {
        let (a, b, c) = match self.kind {
            EstimateKind::Sx => {
                let left = span.nextset(0).unwrap_or(0);
                let right = span.bitlength();
                (left, right, 0)
            }
            EstimateKind::SxLrGaps => {
                let length = span.bitcount();
                let left = span.nextset(0).unwrap_or(0);
                let gaps = span.bitlength().saturating_sub(length + left);
                let right = sent_len.saturating_sub(length + left + gaps);
                (length, left + right, gaps)
            }
        };
        let outside = self.tensor.get(&(label, a, b, c)).copied().unwrap_or(0.0);
        inside + outside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_is_neutral() {
        let est = Estimates::new(EstimateKind::Sx);
        let span: u64 = 0b11;
        assert_eq!(est.score(1, &span, 2.5, 5), 2.5);
    }

    #[test]
    fn sx_lr_gaps_indexes_as_specified() {
        let mut est = Estimates::new(EstimateKind::SxLrGaps);
        // span 0b101: length=2, left=0, bitlength=3, gaps=3-2-0=1, right=5-2-0-1=2
        est.set(7, 2, 0 + 2, 1, 10.0);
        let span: u64 = 0b101;
        assert_eq!(est.score(7, &span, 1.0, 5), 11.0);
    }
}
