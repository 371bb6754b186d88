/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Integration scenarios for the general LCFRS agenda parser: a small
//! recursive "Daruber muss nachgedacht werden(+)" grammar exercising
//! repeated right-recursion, bad word order, and the narrow/wide dispatch
//! boundary in `parse_auto`.

use lcfrs_parser::bits::{MAX_SENTENCE_LEN, WideSpan};
use lcfrs_parser::grammar::{encode_yield_function, Label, LexicalRule, Rule, SimpleGrammar};
use lcfrs_parser::lcfrs::{parse, parse_auto, ParseOptions, ParseOutcome};

/// `S -> VP2`, `VP2 -> DA Y` (base), `VP2 -> VP2 VAINF` (recursive),
/// `Y -> X VAINF`, `X -> MUSS NG`, all plain concatenation. The recursive
/// rule carries zero cost so the Viterbi inside is `ln(2)` regardless of
/// how many extra "werden" tokens are appended.
fn build_grammar() -> (SimpleGrammar, Label) {
    let mut g = SimpleGrammar::new();
    let s = g.intern("S");
    let vp2 = g.intern("VP2");
    let x = g.intern("X");
    let y = g.intern("Y");
    let da = g.intern("DA");
    let ng = g.intern("NG");
    let muss = g.intern("MUSS");
    let vainf = g.intern("VAINF");

    g.add_lexical("Daruber", LexicalRule { lhs: da, prob: 0.0 });
    g.add_lexical("nachgedacht", LexicalRule { lhs: ng, prob: 0.0 });
    g.add_lexical("muss", LexicalRule { lhs: muss, prob: 0.0 });
    g.add_lexical("werden", LexicalRule { lhs: vainf, prob: 0.0 });

    let (cargs, clengths) = encode_yield_function(&[&[0, 1]]);
    g.add_rule(Rule { lhs: x, rhs1: muss, rhs2: ng, args: cargs, lengths: clengths, prob: 0.0, no: 0 });
    g.add_rule(Rule { lhs: y, rhs1: x, rhs2: vainf, args: cargs, lengths: clengths, prob: 0.0, no: 1 });
    g.add_rule(Rule {
        lhs: vp2,
        rhs1: da,
        rhs2: y,
        args: cargs,
        lengths: clengths,
        prob: std::f64::consts::LN_2,
        no: 2,
    });
    g.add_rule(Rule { lhs: vp2, rhs1: vp2, rhs2: vainf, args: cargs, lengths: clengths, prob: 0.0, no: 3 });
    g.add_rule(Rule { lhs: s, rhs1: vp2, rhs2: 0, args: 0b0, lengths: 0b1, prob: 0.0, no: 4 });

    g.finish();
    (g, s)
}

fn words(spec: &[&str]) -> Vec<String> {
    spec.iter().map(|w| w.to_string()).collect()
}

#[test]
fn scenario_1_base_sentence_parses_with_expected_inside() {
    let (g, s) = build_grammar();
    let sent = words(&["Daruber", "muss", "nachgedacht", "werden"]);
    let opts: ParseOptions<u64> = ParseOptions::default();
    let (chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
    assert!(!goal.is_none());
    let edge = chart[&goal].last().unwrap();
    assert!((edge.inside - std::f64::consts::LN_2).abs() < 1e-9);
}

#[test]
fn scenario_2_one_extra_werden_parses_via_recursion() {
    let (g, s) = build_grammar();
    let sent = words(&["Daruber", "muss", "nachgedacht", "werden", "werden"]);
    let opts: ParseOptions<u64> = ParseOptions::default();
    let (_chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
    assert!(!goal.is_none());
}

#[test]
fn scenario_3_two_extra_werden_parses_via_recursion() {
    let (g, s) = build_grammar();
    let sent = words(&["Daruber", "muss", "nachgedacht", "werden", "werden", "werden"]);
    let opts: ParseOptions<u64> = ParseOptions::default();
    let (_chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
    assert!(!goal.is_none());
}

#[test]
fn scenario_4_bad_word_order_reports_no_parse() {
    let (g, s) = build_grammar();
    let sent = words(&["muss", "Daruber", "nachgedacht", "werden"]);
    let opts: ParseOptions<u64> = ParseOptions::default();
    let (_chart, goal, msg) = parse(&sent, &g, None, s, &opts).unwrap();
    assert!(goal.is_none());
    assert!(msg.starts_with("no parse"));
}

#[test]
fn scenario_5_wide_sentence_matches_narrow_inside() {
    let (g, s) = build_grammar();
    let mut words_spec = vec!["Daruber", "muss", "nachgedacht", "werden"];
    let padding = vec!["werden"; 63];
    words_spec.extend(padding.iter());
    assert!(words_spec.len() >= 64);
    let sent = words(&words_spec);

    let narrow_opts: ParseOptions<u64> = ParseOptions::default();
    let wide_opts: ParseOptions<WideSpan> = ParseOptions::default();
    let outcome = parse_auto(&sent, &g, None, s, &narrow_opts, &wide_opts).unwrap();
    match outcome {
        ParseOutcome::Wide(chart, goal, _msg) => {
            assert!(!goal.is_none());
            let edge = chart[&goal].last().unwrap();
            assert!((edge.inside - std::f64::consts::LN_2).abs() < 1e-9);
        }
        ParseOutcome::Narrow(..) => panic!("a {}-word sentence must dispatch to the wide variant", sent.len()),
    }
}

#[test]
fn rejects_sentence_beyond_max_representable_length() {
    let (g, s) = build_grammar();
    let sent = words(&vec!["werden"; MAX_SENTENCE_LEN + 1]);
    let opts: ParseOptions<WideSpan> = ParseOptions::default();
    assert!(parse(&sent, &g, None, s, &opts).is_err());
}
