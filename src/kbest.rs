/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Lazy k-best derivation enumerator (Huang & Chiang 2005) over a finished
//! chart, generic over a small [`Hypergraph`] adapter so the same engine
//! serves both the LCFRS chart ([`LcfrsHypergraph`]) and the CFG chart
//! ([`CfgHypergraph`]).

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use dary_heap::QuaternaryHeap;

use crate::bits::SpanOps;
use crate::cfg::CfgChart;
use crate::grammar::{Grammar, Label};
use crate::item::ChartItem;
use crate::lcfrs::Chart;

/// Recursion/ derivation-depth cap guarding against malformed or cyclic
/// charts (spec §4.4 "Derivation emission").
pub const MAX_DERIVATION_DEPTH: usize = 100;

/// One hyperedge as seen by the k-best engine: a rule's own `-log(p)` plus
/// either a terminal position (lexical edge), 0 nonterminal children
/// (should not occur), 1 child (unary), or 2 children (binary).
#[derive(Clone, Debug)]
pub struct HyperEdge<V> {
    pub prob: f64,
    pub rule_id: u32,
    pub children: Vec<V>,
    pub terminal: Option<usize>,
}

/// Minimal view over a finished chart that the k-best engine needs:
/// the hyperedges deriving a vertex, and how to print that vertex's label.
pub trait Hypergraph {
    type Vertex: Copy + Eq + std::hash::Hash + std::fmt::Debug;
    fn edges(&self, v: &Self::Vertex) -> Vec<HyperEdge<Self::Vertex>>;
    fn label_text(&self, v: &Self::Vertex) -> String;
}

/// `(head, edge, rank_left, rank_right)`: "the edge `edge` derives `head`
/// using the `rank_left`-th best derivation of its left child and the
/// `rank_right`-th best of its right (`-1` if no right child)" (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RankedEdge<V> {
    pub head: V,
    pub edge_idx: usize,
    pub rank: [i32; 2],
}

#[derive(Clone, Copy, Debug)]
struct CandEntry<V> {
    cost: f64,
    edge: RankedEdge<V>,
}

impl<V> PartialEq for CandEntry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl<V> Eq for CandEntry<V> {}
impl<V> PartialOrd for CandEntry<V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<V> Ord for CandEntry<V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cost.total_cmp(&other.cost)
    }
}

/// Per-request memoization state: `D` (ranked, extracted derivations per
/// vertex), `cand` (frontier heap per vertex), and `explored` (dedup set).
struct KBestState<H: Hypergraph> {
    d: HashMap<H::Vertex, Vec<(RankedEdge<H::Vertex>, f64)>>,
    cand: HashMap<H::Vertex, QuaternaryHeap<Reverse<CandEntry<H::Vertex>>>>,
    explored: HashSet<(H::Vertex, usize, i32, i32)>,
    k_global: usize,
}

impl<H: Hypergraph> KBestState<H> {
    fn new(k_global: usize) -> Self {
        KBestState { d: HashMap::new(), cand: HashMap::new(), explored: HashSet::new(), k_global }
    }

    fn d_len(&self, v: &H::Vertex) -> usize {
        self.d.get(v).map_or(0, Vec::len)
    }

    fn get_prob(&self, hg: &H, re: &RankedEdge<H::Vertex>) -> f64 {
        let edges = hg.edges(&re.head);
        let e = &edges[re.edge_idx];
        let mut cost = e.prob;
        for (side, &child) in e.children.iter().enumerate() {
            let rank = re.rank[side] as usize;
            cost += self.d[&child][rank].1;
        }
        cost
    }

    fn seed_cand(&mut self, hg: &H, v: H::Vertex) {
        if self.cand.contains_key(&v) {
            return;
        }
        let edges = hg.edges(&v);
        let mut candidates: Vec<(f64, RankedEdge<H::Vertex>)> = Vec::new();
        for (edge_idx, e) in edges.iter().enumerate() {
            let mut rank = [0i32, -1i32];
            let mut ok = true;
            for (side, &child) in e.children.iter().enumerate() {
                if side > 1 {
                    break;
                }
                self.lazy_kth_best(hg, child, 1);
                if self.d_len(&child) == 0 {
                    ok = false;
                    break;
                }
                if side == 1 {
                    rank[1] = 0;
                }
            }
            if !ok {
                continue;
            }
            let re = RankedEdge { head: v, edge_idx, rank };
            let cost = self.get_prob(hg, &re);
            candidates.push((cost, re));
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.truncate(self.k_global);
        let mut heap = QuaternaryHeap::default();
        for (cost, re) in candidates {
            let key = (re.head, re.edge_idx, re.rank[0], re.rank[1]);
            if self.explored.insert(key) {
                heap.push(Reverse(CandEntry { cost, edge: re }));
            }
        }
        self.cand.insert(v, heap);
    }

    fn lazy_next(&mut self, hg: &H, ej: &RankedEdge<H::Vertex>) {
        let edges = hg.edges(&ej.head);
        let children = edges[ej.edge_idx].children.clone();
        for side in 0..2 {
            if side >= children.len() {
                continue;
            }
            if side == 1 && ej.rank[1] < 0 {
                continue;
            }
            let mut new_rank = ej.rank;
            new_rank[side] += 1;
            let child = children[side];
            self.lazy_kth_best(hg, child, new_rank[side] as usize + 1);
            if (new_rank[side] as usize) < self.d_len(&child) {
                let candidate = RankedEdge { head: ej.head, edge_idx: ej.edge_idx, rank: new_rank };
                let key = (ej.head, ej.edge_idx, new_rank[0], new_rank[1]);
                if self.explored.insert(key) {
                    let cost = self.get_prob(hg, &candidate);
                    self.cand.entry(ej.head).or_default().push(Reverse(CandEntry { cost, edge: candidate }));
                }
            }
        }
    }

    fn lazy_kth_best(&mut self, hg: &H, v: H::Vertex, k: usize) {
        if !self.cand.contains_key(&v) {
            self.seed_cand(hg, v);
        }
        while self.d_len(&v) < k {
            if self.d_len(&v) >= 1 {
                let last = self.d[&v].last().unwrap().0;
                self.lazy_next(hg, &last);
            }
            let popped = self.cand.get_mut(&v).and_then(|h| h.pop());
            match popped {
                Some(Reverse(entry)) => {
                    self.d.entry(v).or_default().push((entry.edge, entry.cost));
                }
                None => break,
            }
        }
    }

    /// Ensure every RankedEdge reachable from `re` is materialized in `D`,
    /// pulling a missing rank-0 child on demand. Returns `false` (and the
    /// caller drops the derivation) if a non-zero rank is requested but
    /// was never produced.
    fn explore(&mut self, hg: &H, re: &RankedEdge<H::Vertex>) -> bool {
        let edges = hg.edges(&re.head);
        let children = edges[re.edge_idx].children.clone();
        for (side, &child) in children.iter().enumerate() {
            let rank = re.rank[side] as usize;
            if self.d_len(&child) <= rank {
                if rank == 0 {
                    self.lazy_kth_best(hg, child, 1);
                } else {
                    return false;
                }
            }
            if self.d_len(&child) <= rank {
                return false;
            }
            let child_re = self.d[&child][rank].0;
            if !self.explore(hg, &child_re) {
                return false;
            }
        }
        true
    }

    fn emit(&self, hg: &H, re: &RankedEdge<H::Vertex>, debinarize_marker: Option<&str>, depth: usize) -> Option<String> {
        if depth > MAX_DERIVATION_DEPTH {
            return None;
        }
        let edges = hg.edges(&re.head);
        let e = &edges[re.edge_idx];
        if let Some(pos) = e.terminal {
            let label = hg.label_text(&re.head);
            return Some(format!("({label} {pos})"));
        }
        let label = hg.label_text(&re.head);
        let splice = debinarize_marker.is_some_and(|m| label.contains(m));
        let mut parts = Vec::new();
        for (side, &child) in e.children.iter().enumerate() {
            let rank = re.rank[side] as usize;
            let child_re = self.d.get(&child)?.get(rank)?.0;
            parts.push(self.emit(hg, &child_re, debinarize_marker, depth + 1)?);
        }
        if splice {
            Some(parts.join(" "))
        } else {
            Some(format!("({label} {})", parts.join(" ")))
        }
    }
}

/// Enumerate up to `k` best derivations rooted at `goal`, as
/// `(derivation string, inside cost)` pairs sorted by cost ascending.
/// Returns fewer than `k` if the chart does not contain that many distinct
/// derivations, and silently drops any derivation whose walk hits a
/// missing non-zero rank rather than emitting a malformed tree (spec §7).
pub fn kbest<H: Hypergraph>(hg: &H, goal: H::Vertex, k: usize, debinarize_marker: Option<&str>) -> Vec<(String, f64)> {
    let mut state: KBestState<H> = KBestState::new(k);
    state.lazy_kth_best(hg, goal, k);
    let ranked = state.d.get(&goal).cloned().unwrap_or_default();
    let mut out = Vec::new();
    for (re, cost) in ranked.into_iter().take(k) {
        if state.explore(hg, &re) {
            if let Some(s) = state.emit(hg, &re, debinarize_marker, 0) {
                out.push((s, cost));
            }
        }
    }
    out
}

/// [`Hypergraph`] adapter over a finished LCFRS [`Chart`].
pub struct LcfrsHypergraph<'a, S: SpanOps, G: Grammar> {
    pub chart: &'a Chart<S>,
    pub grammar: &'a G,
}

impl<'a, S: SpanOps, G: Grammar> Hypergraph for LcfrsHypergraph<'a, S, G> {
    type Vertex = ChartItem<S>;

    fn edges(&self, v: &ChartItem<S>) -> Vec<HyperEdge<ChartItem<S>>> {
        let Some(edges) = self.chart.get(v) else { return Vec::new() };
        edges
            .iter()
            .map(|e| {
                if e.is_lexical() {
                    let pos = e.left.span.nextset(0).unwrap_or(0);
                    HyperEdge { prob: e.prob, rule_id: e.rule_id, children: Vec::new(), terminal: Some(pos) }
                } else if e.is_unary_or_lexical() {
                    HyperEdge { prob: e.prob, rule_id: e.rule_id, children: vec![e.left], terminal: None }
                } else {
                    HyperEdge { prob: e.prob, rule_id: e.rule_id, children: vec![e.left, e.right], terminal: None }
                }
            })
            .collect()
    }

    fn label_text(&self, v: &ChartItem<S>) -> String {
        self.grammar.tolabel(v.label).to_string()
    }
}

/// [`Hypergraph`] adapter over a finished [`CfgChart`]. Vertices are
/// `(label, left, right)` triples.
pub struct CfgHypergraph<'a, G: Grammar> {
    pub chart: &'a CfgChart,
    pub grammar: &'a G,
}

impl<'a, G: Grammar> Hypergraph for CfgHypergraph<'a, G> {
    type Vertex = (Label, usize, usize);

    fn edges(&self, v: &(Label, usize, usize)) -> Vec<HyperEdge<(Label, usize, usize)>> {
        let (label, left, right) = *v;
        self.chart
            .edges(left, right, label)
            .iter()
            .map(|e| match e.mid {
                Some(mid) => HyperEdge {
                    prob: e.prob,
                    rule_id: e.rule_id,
                    children: vec![(e.left_label, left, mid), (e.right_label, mid, right)],
                    terminal: None,
                },
                None if e.left_label == 0 => {
                    HyperEdge { prob: e.prob, rule_id: e.rule_id, children: Vec::new(), terminal: Some(left) }
                }
                None => HyperEdge {
                    prob: e.prob,
                    rule_id: e.rule_id,
                    children: vec![(e.left_label, left, right)],
                    terminal: None,
                },
            })
            .collect()
    }

    fn label_text(&self, v: &(Label, usize, usize)) -> String {
        self.grammar.tolabel(v.0).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{encode_yield_function, LexicalRule, Rule, SimpleGrammar};
    use crate::lcfrs::{parse, ParseOptions};

    fn build_ambiguous_grammar() -> (SimpleGrammar, Label) {
        // S -> A B (two ways to derive B with different costs), A/B lexical.
        let mut g = SimpleGrammar::new();
        let s = g.intern("S");
        let a = g.intern("A");
        let b = g.intern("B");
        let b2 = g.intern("B2");
        g.add_lexical("a", LexicalRule { lhs: a, prob: 0.0 });
        g.add_lexical("b", LexicalRule { lhs: b, prob: 0.1 });
        g.add_lexical("b", LexicalRule { lhs: b2, prob: 0.5 });
        let (args, lengths) = encode_yield_function(&[&[0, 1]]);
        g.add_rule(Rule { lhs: s, rhs1: a, rhs2: b, args, lengths, prob: 0.0, no: 0 });
        g.add_rule(Rule { lhs: s, rhs1: a, rhs2: b2, args, lengths, prob: 0.0, no: 1 });
        g.finish();
        (g, s)
    }

    #[test]
    fn kbest_one_returns_viterbi_derivation() {
        let (g, s) = build_ambiguous_grammar();
        let sent: Vec<String> = ["a", "b"].iter().map(|x| x.to_string()).collect();
        let opts: ParseOptions<u64> = ParseOptions { exhaustive: true, ..Default::default() };
        let (chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
        let hg = LcfrsHypergraph { chart: &chart, grammar: &g };
        let best = kbest(&hg, goal, 1, None);
        assert_eq!(best.len(), 1);
        // S -> A B (lexical insides 0.0 + 0.1) beats S -> A B2 (0.0 + 0.5).
        assert!((best[0].1 - 0.1).abs() < 1e-9);
    }

    #[test]
    fn kbest_is_sorted_and_deduplicated() {
        let (g, s) = build_ambiguous_grammar();
        let sent: Vec<String> = ["a", "b"].iter().map(|x| x.to_string()).collect();
        let opts: ParseOptions<u64> = ParseOptions { exhaustive: true, ..Default::default() };
        let (chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
        let hg = LcfrsHypergraph { chart: &chart, grammar: &g };
        let best = kbest(&hg, goal, 5, None);
        assert!(best.len() >= 2);
        for w in best.windows(2) {
            assert!(w[0].1 <= w[1].1 + 1e-9);
        }
        let mut seen = HashSet::new();
        for (s, _) in &best {
            assert!(seen.insert(s.clone()), "duplicate derivation: {s}");
        }
    }
}
