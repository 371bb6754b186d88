/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Integration scenario for the CFG-specialized parser plus the lazy
//! k-best enumerator running over it: a unary chain `S -> D -> NP VP`
//! over "mary walks", checked against the testable properties in the
//! spec's invariants 6-8 (Viterbi correctness, k-best sortedness/
//! dedup, and k=1 reproducing the Viterbi derivation).

use std::collections::HashSet;

use lcfrs_parser::cfg::cfgparse;
use lcfrs_parser::grammar::{encode_yield_function, Label, LexicalRule, Rule, SimpleGrammar};
use lcfrs_parser::kbest::{kbest, CfgHypergraph};

fn build_grammar() -> (SimpleGrammar, Label) {
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
    (g, s)
}

#[test]
fn viterbi_matches_the_only_derivation_and_chart_shape() {
    let (g, s) = build_grammar();
    let sent: Vec<String> = ["mary", "walks"].iter().map(|w| w.to_string()).collect();
    let (chart, goal) = cfgparse(&sent, &g, s, None).unwrap();
    let (label, left, right) = goal.expect("mary walks should parse");
    assert_eq!((label, left, right), (s, 0, 2));
    assert!((chart.viterbi(s, 0, 2) - 0.3).abs() < 1e-9);
    assert_eq!(chart.edges(0, 2, g.toid("D").unwrap()).len(), 1);
    assert_eq!(chart.edges(0, 2, s).len(), 1);
}

#[test]
fn kbest_over_cfg_chart_is_sorted_deduplicated_and_k1_is_viterbi() {
    let (g, s) = build_grammar();
    let sent: Vec<String> = ["mary", "walks"].iter().map(|w| w.to_string()).collect();
    let (chart, goal) = cfgparse(&sent, &g, s, None).unwrap();
    let goal = goal.unwrap();

    let hg = CfgHypergraph { chart: &chart, grammar: &g };
    let top1 = kbest(&hg, goal, 1, None);
    assert_eq!(top1.len(), 1);
    assert!((top1[0].1 - chart.viterbi(goal.0, goal.1, goal.2)).abs() < 1e-9);

    let top5 = kbest(&hg, goal, 5, None);
    assert_eq!(top5.len(), 1, "this grammar has exactly one derivation of 'mary walks'");
    for w in top5.windows(2) {
        assert!(w[0].1 <= w[1].1 + 1e-9);
    }
    let mut seen = HashSet::new();
    for (derivation, _) in &top5 {
        assert!(seen.insert(derivation.clone()));
    }
    assert!(top5[0].0.contains("S"));
    assert!(top5[0].0.contains("0") || top5[0].0.contains("1"));
}
