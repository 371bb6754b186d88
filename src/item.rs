/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Chart items and hyperedges: the immutable value objects the parsers and
//! the k-best enumerator pass around.

use crate::bits::SpanOps;
use crate::grammar::{Label, EPSILON};

/// `(nonterminal, span)`, the vertex identity of the parse hypergraph.
///
/// Equality and hashing combine both fields. [`ChartItem::none`] is the
/// distinguished sentinel backpointer (`label = 0`, empty span).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartItem<S: SpanOps> {
    pub label: Label,
    pub span: S,
}

impl<S: SpanOps> ChartItem<S> {
    #[inline]
    pub fn new(label: Label, span: S) -> Self {
        ChartItem { label, span }
    }

    /// The sentinel `NONE` item used as a placeholder backpointer for
    /// lexical/unary edges' missing right child.
    #[inline]
    pub fn none() -> Self {
        ChartItem { label: EPSILON, span: S::empty() }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.label == EPSILON && self.span.is_empty()
    }
}

impl<S: SpanOps> std::fmt::Debug for ChartItem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartItem").field("label", &self.label).field("span", &self.span).finish()
    }
}

/// A single hyperedge: the rule probability, the total inside cost of the
/// derivation it roots, the agenda-priority `score`, the rule that produced
/// it, and up to two backpointers.
///
/// `right.label == 0` marks a unary or lexical edge. For lexical edges
/// `left` additionally carries the scanned input position in its span field
/// (see [`ChartItem::none`] callers in `lcfrs::scan`).
#[derive(Clone, Copy, Debug)]
pub struct Edge<S: SpanOps> {
    /// `inside + FOM estimate` (or `== inside` with no estimate). Agenda
    /// ordering key.
    pub score: f64,
    /// Total derivation cost: `prob` plus children's insides. Chart
    /// tie-breaking key and the value k-best sums over.
    pub inside: f64,
    /// The producing rule's own `-log(p)`.
    pub prob: f64,
    pub rule_id: u32,
    pub left: ChartItem<S>,
    pub right: ChartItem<S>,
}

impl<S: SpanOps> Edge<S> {
    #[inline]
    pub fn is_unary_or_lexical(&self) -> bool {
        self.right.label == EPSILON
    }

    /// A lexical edge additionally has no real left nonterminal: its `left`
    /// field is `(EPSILON, singleton(position))`.
    #[inline]
    pub fn is_lexical(&self) -> bool {
        self.is_unary_or_lexical() && self.left.label == EPSILON
    }
}
