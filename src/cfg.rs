/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Dedicated CKY parser for the monotone-CFG special case (all yield
//! functions are `((0,1),)` or `((0,),)`), using dense Viterbi/split-index
//! storage instead of the general bitvector agenda (spec §4.3).

use std::collections::HashMap;

use crate::grammar::{Grammar, Label};

/// One hyperedge in a CFG chart cell: either a lexical edge (`mid` and
/// `left_label` both `None`/`0`), a unary edge (`mid == None`,
/// `right_label == 0`), or a binary edge.
#[derive(Clone, Copy, Debug)]
pub struct CfgEdge {
    pub rule_id: u32,
    /// The producing rule's own `-log(p)`.
    pub prob: f64,
    /// Total inside cost of the derivation this edge roots.
    pub inside: f64,
    /// Split point for a binary edge.
    pub mid: Option<usize>,
    pub left_label: Label,
    /// `0` for unary/lexical edges.
    pub right_label: Label,
}

/// `chart[left][right][label] -> list<CFGEdge>`, paired with the dense
/// Viterbi matrix and the four split-index filter matrices (spec §3/§4.3).
pub struct CfgChart {
    n: usize,
    num_labels: usize,
    cells: Vec<Vec<HashMap<Label, Vec<CfgEdge>>>>,
    viterbi: Vec<f64>,
    minsplitleft: Vec<Option<usize>>,
    maxsplitleft: Vec<Option<usize>>,
    minsplitright: Vec<Option<usize>>,
    maxsplitright: Vec<Option<usize>>,
}

impl CfgChart {
    fn new(n: usize, num_labels: usize) -> Self {
        CfgChart {
            n,
            num_labels,
            cells: (0..=n).map(|_| (0..=n).map(|_| HashMap::new()).collect()).collect(),
            viterbi: vec![f64::INFINITY; num_labels * n * (n + 1)],
            minsplitleft: vec![None; num_labels * (n + 1)],
            maxsplitleft: vec![None; num_labels * (n + 1)],
            minsplitright: vec![None; num_labels * (n + 1)],
            maxsplitright: vec![None; num_labels * (n + 1)],
        }
    }

    #[inline]
    fn vidx(&self, label: Label, left: usize, right: usize) -> usize {
        (label as usize) * self.n * (self.n + 1) + left * (self.n + 1) + right
    }

    #[inline]
    fn fidx(&self, label: Label, pos: usize) -> usize {
        (label as usize) * (self.n + 1) + pos
    }

    pub fn viterbi(&self, label: Label, left: usize, right: usize) -> f64 {
        self.viterbi[self.vidx(label, left, right)]
    }

    fn set_viterbi(&mut self, label: Label, left: usize, right: usize, cost: f64) {
        let idx = self.vidx(label, left, right);
        self.viterbi[idx] = cost;
    }

    pub fn edges(&self, left: usize, right: usize, label: Label) -> &[CfgEdge] {
        self.cells[left][right].get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push_edge(&mut self, left: usize, right: usize, label: Label, edge: CfgEdge) {
        self.cells[left][right].entry(label).or_default().push(edge);
    }

    /// Update the four split-index filters for `label` now that it is
    /// finite over `[left, right)`. Only called on a `+inf -> finite`
    /// transition per spec §4.3.
    fn update_filters(&mut self, label: Label, left: usize, right: usize) {
        let l_idx = self.fidx(label, left);
        self.maxsplitright[l_idx] = Some(self.maxsplitright[l_idx].map_or(right, |v| v.max(right)));
        self.minsplitright[l_idx] = Some(self.minsplitright[l_idx].map_or(right, |v| v.min(right)));
        let r_idx = self.fidx(label, right);
        self.maxsplitleft[r_idx] = Some(self.maxsplitleft[r_idx].map_or(left, |v| v.max(left)));
        self.minsplitleft[r_idx] = Some(self.minsplitleft[r_idx].map_or(left, |v| v.min(left)));
    }
}

/// Run the CFG CKY parser over `sent`. Returns the finished chart plus the
/// goal `(start, 0, n)` iff `viterbi[start, 0, n]` is finite.
pub fn cfgparse<G: Grammar>(
    sent: &[String],
    grammar: &G,
    start: Label,
    tags: Option<&[String]>,
) -> anyhow::Result<(CfgChart, Option<(Label, usize, usize)>)> {
    let n = sent.len();
    anyhow::ensure!(n > 0, "cfgparse requires a non-empty sentence");
    let num_labels = grammar.nonterminals() + 1;
    let mut chart = CfgChart::new(n, num_labels);

    // Lexical scan (span 1), same DOP-tag matching rules as the LCFRS scan.
    for (i, word) in sent.iter().enumerate() {
        let (left, right) = (i, i + 1);
        let mut fired = false;
        for lr in grammar.lexical(word) {
            let allowed = match tags {
                None => true,
                Some(t) => {
                    let tag = t[i].as_str();
                    let label_str = grammar.tolabel(lr.lhs);
                    label_str == tag || label_str.starts_with(&format!("{tag}@"))
                }
            };
            if !allowed {
                continue;
            }
            fired = true;
            admit_terminal(&mut chart, lr.lhs, left, right, lr.prob, u32::MAX);
        }
        if !fired {
            if let Some(t) = tags {
                if let Some(lhs) = grammar.toid(&t[i]) {
                    fired = true;
                    admit_terminal(&mut chart, lhs, left, right, 0.0, u32::MAX);
                }
            }
        }
        if !fired {
            anyhow::bail!("not covered: '{word}'");
        }
        unary_closure(&mut chart, grammar, left, right);
    }

    // Binary combination, cell by cell in increasing span order.
    for span in 2..=n {
        for left in 0..=(n - span) {
            let right = left + span;
            for rule in grammar.all_rules() {
                if rule.rhs2 == 0 {
                    continue; // unary, handled by unary_closure
                }
                let a = rule.rhs1;
                let b = rule.rhs2;
                let narrow_r = chart.minsplitright[chart.fidx(a, left)];
                let narrow_l = chart.minsplitleft[chart.fidx(b, right)];
                let wide_l = chart.maxsplitleft[chart.fidx(b, right)];
                let wide_r = chart.maxsplitright[chart.fidx(a, left)];
                let (Some(narrow_r), Some(narrow_l), Some(wide_l), Some(wide_r)) =
                    (narrow_r, narrow_l, wide_l, wide_r)
                else {
                    continue;
                };
                if narrow_r >= right || narrow_l < narrow_r {
                    continue;
                }
                let min_mid = narrow_r.max(wide_l);
                let max_mid = wide_r.min(narrow_l) + 1;
                for mid in min_mid..max_mid {
                    let left_cost = chart.viterbi(a, left, mid);
                    let right_cost = chart.viterbi(b, mid, right);
                    if !left_cost.is_finite() || !right_cost.is_finite() {
                        continue;
                    }
                    let inside = rule.prob + left_cost + right_cost;
                    let edge = CfgEdge {
                        rule_id: rule.no,
                        prob: rule.prob,
                        inside,
                        mid: Some(mid),
                        left_label: a,
                        right_label: b,
                    };
                    chart.push_edge(left, right, rule.lhs, edge);
                    let was_infinite = !chart.viterbi(rule.lhs, left, right).is_finite();
                    if inside < chart.viterbi(rule.lhs, left, right) {
                        chart.set_viterbi(rule.lhs, left, right, inside);
                        if was_infinite {
                            chart.update_filters(rule.lhs, left, right);
                        }
                    }
                }
            }
            unary_closure(&mut chart, grammar, left, right);
        }
    }

    let goal_cost = chart.viterbi(start, 0, n);
    let goal = if goal_cost.is_finite() { Some((start, 0, n)) } else { None };
    Ok((chart, goal))
}

fn admit_terminal(chart: &mut CfgChart, label: Label, left: usize, right: usize, prob: f64, rule_id: u32) {
    let edge = CfgEdge { rule_id, prob, inside: prob, mid: None, left_label: 0, right_label: 0 };
    chart.push_edge(left, right, label, edge);
    let was_infinite = !chart.viterbi(label, left, right).is_finite();
    if prob < chart.viterbi(label, left, right) {
        chart.set_viterbi(label, left, right, prob);
        if was_infinite {
            chart.update_filters(label, left, right);
        }
    }
}

/// Per-cell unary closure: repeatedly apply unary rules to whatever is
/// currently finite in `[left, right)` via a small priority agenda, until
/// no further improvement is possible (spec §4.3 "Unary closure per cell").
/// Terminates because every reinsertion strictly decreases a Viterbi cost
/// on a finite semiring.
fn unary_closure<G: Grammar>(chart: &mut CfgChart, grammar: &G, left: usize, right: usize) {
    let mut agenda: std::collections::BinaryHeap<std::cmp::Reverse<(ordered_cost::OrderedCost, Label)>> =
        std::collections::BinaryHeap::new();
    let mut seen = std::collections::HashSet::new();
    for label in 0..chart.num_labels as Label {
        let cost = chart.viterbi(label, left, right);
        if cost.is_finite() && seen.insert(label) {
            agenda.push(std::cmp::Reverse((ordered_cost::OrderedCost(cost), label)));
        }
    }
    while let Some(std::cmp::Reverse((_, label))) = agenda.pop() {
        let base_cost = chart.viterbi(label, left, right);
        for rule in grammar.unary(label) {
            if rule.rhs1 != label {
                break;
            }
            let inside = rule.prob + base_cost;
            let edge = CfgEdge {
                rule_id: rule.no,
                prob: rule.prob,
                inside,
                mid: None,
                left_label: label,
                right_label: 0,
            };
            chart.push_edge(left, right, rule.lhs, edge);
            let was_infinite = !chart.viterbi(rule.lhs, left, right).is_finite();
            if inside < chart.viterbi(rule.lhs, left, right) {
                chart.set_viterbi(rule.lhs, left, right, inside);
                if was_infinite {
                    chart.update_filters(rule.lhs, left, right);
                }
                agenda.push(std::cmp::Reverse((ordered_cost::OrderedCost(inside), rule.lhs)));
            }
        }
    }
}

/// Minimal total-order wrapper over `f64` costs for the unary-closure
/// agenda, which never sees NaN (rule probabilities and inside costs are
/// always finite, non-negative `-log(p)` sums).
mod ordered_cost {
    #[derive(Clone, Copy, PartialEq, Debug)]
    pub struct OrderedCost(pub f64);
    impl Eq for OrderedCost {}
    impl PartialOrd for OrderedCost {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for OrderedCost {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.total_cmp(&other.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{encode_yield_function, LexicalRule, Rule, SimpleGrammar};

    #[test]
    fn unary_chain_produces_one_binary_and_one_unary_edge() {
        // S -> D, D -> NP VP, NP -> "mary", VP -> "walks"
        let mut g = SimpleGrammar::new();
        let s = g.intern("S");
        let d = g.intern("D");
        let np = g.intern("NP");
        let vp = g.intern("VP");
        g.add_lexical("mary", LexicalRule { lhs: np, prob: 0.0 });
        g.add_lexical("walks", LexicalRule { lhs: vp, prob: 0.0 });
        let (args, lengths) = encode_yield_function(&[&[0, 1]]);
        g.add_rule(Rule { lhs: d, rhs1: np, rhs2: vp, args, lengths, prob: 0.1, no: 0 });
        g.add_rule(Rule { lhs: s, rhs1: d, rhs2: 0, args: 0b0, lengths: 0b1, prob: 0.2, no: 1 });
        g.finish();

        let sent: Vec<String> = ["mary", "walks"].iter().map(|s| s.to_string()).collect();
        let (chart, goal) = cfgparse(&sent, &g, s, None).unwrap();
        assert_eq!(goal, Some((s, 0, 2)));
        assert!(chart.viterbi(s, 0, 2).is_finite());
        assert_eq!(chart.edges(0, 2, d).len(), 1);
        assert_eq!(chart.edges(0, 2, s).len(), 1);
    }

    #[test]
    fn uncovered_word_is_an_error() {
        let g = SimpleGrammar::new();
        let sent: Vec<String> = vec!["nope".to_string()];
        assert!(cfgparse(&sent, &g, 0, None).is_err());
    }
}
