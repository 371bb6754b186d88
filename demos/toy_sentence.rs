/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parses a small discontinuous German VP ("Daruber muss nachgedacht
//! werden") with the general LCFRS agenda parser and prints its k-best
//! derivations.

use itertools::Itertools;

use lcfrs_parser::prelude::*;

fn build_grammar() -> (SimpleGrammar, Label) {
    let mut g = SimpleGrammar::new();
    let s = g.intern("S");
    let vp2 = g.intern("VP2");
    let vainf = g.intern("VAINF");
    g.set_fanout(vp2, 2);
    g.set_fanout(s, 1);
    g.set_fanout(vainf, 1);

    g.add_lexical("Daruber", LexicalRule { lhs: g.intern("DA"), prob: 0.0 });
    g.add_lexical("nachgedacht", LexicalRule { lhs: g.intern("NG"), prob: 0.0 });
    g.add_lexical("muss", LexicalRule { lhs: g.intern("MUSS"), prob: 0.0 });
    g.add_lexical("werden", LexicalRule { lhs: vainf, prob: 0.0 });

    let da = g.toid("DA").unwrap();
    let ng = g.toid("NG").unwrap();
    let muss = g.toid("MUSS").unwrap();

    let x = g.intern("X");
    g.set_fanout(x, 1);
    let (xargs, xlengths) = lcfrs_parser::grammar::encode_yield_function(&[&[0, 1]]);
    g.add_rule(Rule { lhs: x, rhs1: muss, rhs2: ng, args: xargs, lengths: xlengths, prob: 0.0, no: 0 });

    let (vargs, vlengths) = lcfrs_parser::grammar::encode_yield_function(&[&[0, 1]]);
    g.add_rule(Rule { lhs: vp2, rhs1: da, rhs2: x, args: vargs, lengths: vlengths, prob: 0.1, no: 1 });

    let (sargs, slengths) = lcfrs_parser::grammar::encode_yield_function(&[&[0, 1]]);
    g.add_rule(Rule { lhs: s, rhs1: vp2, rhs2: vainf, args: sargs, lengths: slengths, prob: 0.2, no: 2 });

    g.finish();
    (g, s)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let sent: Vec<String> = if args.is_empty() {
        ["Daruber", "muss", "nachgedacht", "werden"].iter().map(|w| w.to_string()).collect()
    } else {
        args
    };
    println!("sentence: {}", sent.iter().join(" "));

    let (grammar, start) = build_grammar();
    let opts: ParseOptions<u64> = ParseOptions { exhaustive: true, ..Default::default() };
    let (chart, goal, message) = parse(&sent, &grammar, None, start, &opts)?;
    println!("parse status: {message}");
    if goal.is_none() {
        return Ok(());
    }

    let hg = LcfrsHypergraph { chart: &chart, grammar: &grammar };
    for (rank, (derivation, cost)) in kbest(&hg, goal, 3, None).into_iter().enumerate() {
        println!("#{rank}: cost={cost:.4} {derivation}");
    }
    Ok(())
}
