/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parses a tiny unary-chained CFG ("mary walks") with the dense
//! CFG-specialized CKY parser and prints its k-best derivations.

use itertools::Itertools;

use lcfrs_parser::prelude::*;

fn build_grammar() -> (SimpleGrammar, Label) {
    let mut g = SimpleGrammar::new();
    let s = g.intern("S");
    let d = g.intern("D");
    let np = g.intern("NP");
    let vp = g.intern("VP");
    g.add_lexical("mary", LexicalRule { lhs: np, prob: 0.0 });
    g.add_lexical("walks", LexicalRule { lhs: vp, prob: 0.0 });
    let (args, lengths) = lcfrs_parser::grammar::encode_yield_function(&[&[0, 1]]);
    g.add_rule(Rule { lhs: d, rhs1: np, rhs2: vp, args, lengths, prob: 0.1, no: 0 });
    g.add_rule(Rule { lhs: s, rhs1: d, rhs2: 0, args: 0b0, lengths: 0b1, prob: 0.2, no: 1 });
    g.finish();
    (g, s)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let sent: Vec<String> =
        if args.is_empty() { ["mary", "walks"].iter().map(|w| w.to_string()).collect() } else { args };
    println!("sentence: {}", sent.iter().join(" "));

    let (grammar, start) = build_grammar();
    let (chart, goal) = cfgparse(&sent, &grammar, start, None)?;
    let Some((label, left, right)) = goal else {
        println!("no parse");
        return Ok(());
    };
    println!("best cost: {:.4}", chart.viterbi(label, left, right));

    let hg = CfgHypergraph { chart: &chart, grammar: &grammar };
    for (rank, (derivation, cost)) in kbest(&hg, (label, left, right), 2, None).into_iter().enumerate() {
        println!("#{rank}: cost={cost:.4} {derivation}");
    }
    Ok(())
}
