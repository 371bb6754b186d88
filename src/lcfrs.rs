/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Agenda-driven LCFRS CKY parser over bitvector span encodings.
//!
//! The engine is monomorphized over [`SpanOps`] rather than branching on
//! sentence width inside the hot loop; [`parse_auto`] is the single
//! dispatch point that picks narrow (`u64`) vs. wide ([`WideSpan`]) spans
//! per spec §3/"Polymorphism over span width".

use std::collections::HashMap;
use std::fmt;

use crate::agenda::Agenda;
use crate::bits::{SpanOps, WideSpan, MAX_SENTENCE_LEN};
use crate::estimate::{Estimates, INF_DROP_THRESHOLD};
use crate::grammar::{Grammar, Label, Rule, EPSILON};
use crate::item::{ChartItem, Edge};
use crate::whitelist::Whitelist;

/// The LCFRS chart: every discovered derivation per chart item. The
/// single best derivation for `item` is additionally tracked in the
/// parser's internal Viterbi index and mirrored here once the item is
/// admitted (spec §3 "Chart (LCFRS)").
pub type Chart<S> = HashMap<ChartItem<S>, Vec<Edge<S>>>;

/// Runtime parse configuration. The engine does no I/O and owns no
/// environment (spec §6), so this is a plain builder-style struct rather
/// than env vars or config files.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions<S: SpanOps> {
    /// Keep exploring after the goal item is first admitted, retaining
    /// every suboptimal edge, instead of stopping at the first derivation.
    pub exhaustive: bool,
    pub whitelist: Option<Whitelist<S>>,
    /// Whether whitelist admission should reproject discontinuous items
    /// into their contiguous components (spec §4.2 splitprune mode).
    pub splitprune: bool,
    /// Whether splitprune components are checked against a per-position
    /// map (`true`) or a single shared map (`false`).
    pub markorigin: bool,
    pub estimates: Option<Estimates>,
    /// First-come-first-served admission cap per derived span. `0`
    /// disables it. Only enforced when built with the `beam` feature;
    /// otherwise stored but ignored, so the common path carries no cost.
    pub beamwidth: usize,
}

/// Agenda/chart/blocked counters accumulated during a parse, satisfying
/// the "diagnostic message including agenda/chart/blocked counters"
/// contract of spec §4.2/§6. `Display` renders the same counters the
/// spec's prose `message` string carries.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseStats {
    pub max_agenda: usize,
    pub final_agenda: usize,
    pub admitted: usize,
    pub labels_touched: usize,
    pub total_edges: usize,
    pub blocked: usize,
    /// Times the defensive reentry branch (spec §4.2 `process_edge` case 4)
    /// fired. Should stay `0` under a consistent FOM estimate.
    pub reentries: usize,
}

impl fmt::Display for ParseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agenda max={} final={} admitted={} labels={} edges={} blocked={} reentries={}",
            self.max_agenda,
            self.final_agenda,
            self.admitted,
            self.labels_touched,
            self.total_edges,
            self.blocked,
            self.reentries
        )
    }
}

/// `(chart, goal item or NONE, diagnostic message)`. The two narrow/wide
/// flavors of [`parse`], unified for callers that don't want to pick the
/// span width themselves.
pub enum ParseOutcome {
    Narrow(Chart<u64>, ChartItem<u64>, String),
    Wide(Chart<WideSpan>, ChartItem<WideSpan>, String),
}

/// Parse `sent` against `grammar`, picking narrow or wide spans based on
/// sentence length (spec §3: narrow below 64 positions, wide up to
/// `MAX_SENTENCE_LEN`). This is the crate's single width-dispatch point;
/// [`parse`] itself never branches on width.
pub fn parse_auto<G: Grammar>(
    sent: &[String],
    grammar: &G,
    tags: Option<&[String]>,
    start: Label,
    narrow_opts: &ParseOptions<u64>,
    wide_opts: &ParseOptions<WideSpan>,
) -> anyhow::Result<ParseOutcome> {
    if sent.len() < 64 {
        let (chart, goal, msg) = parse(sent, grammar, tags, start, narrow_opts)?;
        Ok(ParseOutcome::Narrow(chart, goal, msg))
    } else {
        let (chart, goal, msg) = parse(sent, grammar, tags, start, wide_opts)?;
        Ok(ParseOutcome::Wide(chart, goal, msg))
    }
}

/// The full span `[0, n)`, i.e. every input position covered.
fn full_span<S: SpanOps>(n: usize) -> S {
    let mut s = S::empty();
    s.set_range(0, n);
    s
}

/// Yield-function compatibility test (spec §4.2 "concat"). Shared verbatim
/// between narrow and wide spans: since it is generic over [`SpanOps`]
/// rather than duplicated per width, invariant 5 ("concat == fatconcat")
/// holds by construction instead of needing a separate proof.
pub fn concat<S: SpanOps>(rule: &Rule, lvec: S, rvec: S) -> bool {
    if !lvec.intersect_is_empty(&rvec) {
        return false;
    }
    if rule.is_plain_concatenation() {
        return contiguous_concat(&lvec, &rvec);
    }
    let num_atoms = rule.num_atoms();
    let mut lvec = lvec;
    let mut rvec = rvec;
    let mut pos = if rule.atom_is_right(0) {
        match rvec.nextset(0) {
            Some(p) => p,
            None => return false,
        }
    } else {
        match lvec.nextset(0) {
            Some(p) => p,
            None => return false,
        }
    };
    for n in 0..num_atoms {
        let from_right = rule.atom_is_right(n);
        let selected = if from_right { &mut rvec } else { &mut lvec };
        if !selected.testbit(pos) {
            return false;
        }
        let run_end = selected.nextunset(pos);
        selected.clear_range(pos, run_end);
        if rule.is_boundary(n) {
            if n + 1 == num_atoms {
                break;
            }
            if lvec.testbit(run_end) || rvec.testbit(run_end) {
                return false;
            }
            pos = match (lvec.nextset(run_end), rvec.nextset(run_end)) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => return false,
            };
        } else {
            pos = run_end;
        }
    }
    lvec.is_empty() && rvec.is_empty()
}

/// Fast path for the plain two-atom concatenation yield function
/// `((0,1),)`: `lvec` and `rvec` must each be a single contiguous run, with
/// `rvec` starting exactly where `lvec` ends.
fn contiguous_concat<S: SpanOps>(lvec: &S, rvec: &S) -> bool {
    let Some(lstart) = lvec.nextset(0) else { return false };
    let lend = lvec.bitlength();
    if lvec.bitcount() != lend - lstart {
        return false;
    }
    let Some(rstart) = rvec.nextset(0) else { return false };
    let rend = rvec.bitlength();
    if rvec.bitcount() != rend - rstart {
        return false;
    }
    rstart == lend
}

#[cfg(feature = "beam")]
fn beam_admit<S: SpanOps>(histogram: &mut HashMap<S, usize>, span: S, beamwidth: usize) -> bool {
    if beamwidth == 0 {
        return true;
    }
    let counter = histogram.entry(span).or_insert(0);
    *counter += 1;
    *counter <= beamwidth
}

#[cfg(not(feature = "beam"))]
fn beam_admit<S: SpanOps>(_histogram: &mut HashMap<S, usize>, _span: S, _beamwidth: usize) -> bool {
    true
}

/// Agenda/chart arbitration for one candidate edge (spec §4.2
/// `process_edge`), evaluated as the five cases in the order specified.
#[allow(clippy::too_many_arguments)]
fn process_edge<S: SpanOps>(
    item: ChartItem<S>,
    edge: Edge<S>,
    agenda: &mut Agenda<S>,
    chart: &mut Chart<S>,
    viterbi: &HashMap<ChartItem<S>, Edge<S>>,
    whitelist: Option<&Whitelist<S>>,
    splitprune: bool,
    fanout: usize,
    exhaustive: bool,
    stats: &mut ParseStats,
) {
    if !chart.contains_key(&item) {
        // Case 1: brand new item.
        if let Some(wl) = whitelist {
            if !wl.admits(&item, fanout, splitprune) {
                stats.blocked += 1;
                return;
            }
        }
        chart.insert(item, Vec::new());
        agenda.push(item, edge);
        stats.admitted += 1;
        return;
    }
    if agenda.contains(&item) {
        if !exhaustive {
            // Case 2: first-parse mode, still queued.
            agenda.set_if_better(&item, edge);
            return;
        }
        // Case 3: exhaustive mode, still queued, strictly better inside.
        let queued = *agenda.peek_edge(&item).unwrap();
        if edge.inside < queued.inside {
            agenda.replace(&item, edge);
            chart.get_mut(&item).unwrap().push(queued);
        }
        return;
    }
    // Item already admitted (popped); compare against its Viterbi edge.
    let best = viterbi[&item];
    if edge.inside < best.inside {
        // Case 4: reentry. Should not happen under a consistent FOM.
        log::warn!(
            "process_edge: item {item:?} improved (inside {} < {}) after admission; \
             reinserting into agenda (inconsistent figure-of-merit?)",
            edge.inside,
            best.inside
        );
        stats.reentries += 1;
        agenda.push(item, edge);
    } else if exhaustive {
        // Case 5: exhaustive mode, already admitted, suboptimal edge.
        chart.get_mut(&item).unwrap().push(edge);
    }
}

/// Run the agenda-driven LCFRS CKY parser over `sent`.
///
/// Returns `(chart, goal_or_none, message)` per spec §4.2's public
/// contract. Failure to find any derivation pairs `NONE` with a "no
/// parse" message (spec §7); an uncoverable token short-circuits with
/// "not covered" before the agenda ever runs.
pub fn parse<S: SpanOps, G: Grammar>(
    sent: &[String],
    grammar: &G,
    tags: Option<&[String]>,
    start: Label,
    opts: &ParseOptions<S>,
) -> anyhow::Result<(Chart<S>, ChartItem<S>, String)> {
    let n = sent.len();
    anyhow::ensure!(
        n <= MAX_SENTENCE_LEN,
        "sentence length {n} exceeds the maximum representable length {MAX_SENTENCE_LEN}"
    );

    let mut chart: Chart<S> = HashMap::new();
    let mut viterbi: HashMap<ChartItem<S>, Edge<S>> = HashMap::new();
    let mut by_label: HashMap<Label, Vec<ChartItem<S>>> = HashMap::new();
    let mut agenda: Agenda<S> = Agenda::new();
    let mut stats = ParseStats::default();
    let mut beam_histogram: HashMap<S, usize> = HashMap::new();

    // --- Scan ---
    for (i, word) in sent.iter().enumerate() {
        let span = S::singleton(i);
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
            let inside = lr.prob;
            let score = match &opts.estimates {
                Some(est) => est.score(lr.lhs, &span, inside, n),
                None => inside,
            };
            if score > INF_DROP_THRESHOLD {
                continue;
            }
            let item = ChartItem::new(lr.lhs, span);
            let edge = Edge {
                score,
                inside,
                prob: lr.prob,
                rule_id: u32::MAX,
                left: ChartItem::new(EPSILON, span),
                right: ChartItem::none(),
            };
            process_edge(
                item,
                edge,
                &mut agenda,
                &mut chart,
                &viterbi,
                opts.whitelist.as_ref(),
                opts.splitprune,
                grammar.fanout(lr.lhs),
                opts.exhaustive,
                &mut stats,
            );
        }
        if !fired {
            if let Some(t) = tags {
                if let Some(lhs) = grammar.toid(&t[i]) {
                    let inside = 0.0;
                    let score = match &opts.estimates {
                        Some(est) => est.score(lhs, &span, inside, n),
                        None => inside,
                    };
                    if score <= INF_DROP_THRESHOLD {
                        fired = true;
                        let item = ChartItem::new(lhs, span);
                        let edge = Edge {
                            score,
                            inside,
                            prob: 0.0,
                            rule_id: u32::MAX,
                            left: ChartItem::new(EPSILON, span),
                            right: ChartItem::none(),
                        };
                        process_edge(
                            item,
                            edge,
                            &mut agenda,
                            &mut chart,
                            &viterbi,
                            opts.whitelist.as_ref(),
                            opts.splitprune,
                            grammar.fanout(lhs),
                            opts.exhaustive,
                            &mut stats,
                        );
                    }
                }
            }
        }
        if !fired {
            return Ok((chart, ChartItem::none(), format!("not covered: '{word}'")));
        }
    }

    let goal = ChartItem::new(start, full_span(n));

    // --- Expand ---
    while let Some((item, edge)) = agenda.pop() {
        stats.max_agenda = stats.max_agenda.max(agenda.len() + 1);
        chart.get_mut(&item).unwrap().push(edge);
        viterbi.insert(item, edge);
        by_label.entry(item.label).or_default().push(item);
        stats.total_edges += 1;

        let is_goal = item == goal;
        if is_goal && !opts.exhaustive {
            break;
        }

        // Unary.
        for rule in grammar.unary(item.label) {
            if rule.rhs1 != item.label {
                break;
            }
            if !beam_admit(&mut beam_histogram, item.span, opts.beamwidth) {
                continue;
            }
            let new_item = ChartItem::new(rule.lhs, item.span);
            let inside = rule.prob + edge.inside;
            let score = match &opts.estimates {
                Some(est) => est.score(rule.lhs, &item.span, inside, n),
                None => inside,
            };
            if score > INF_DROP_THRESHOLD {
                continue;
            }
            let new_edge = Edge {
                score,
                inside,
                prob: rule.prob,
                rule_id: rule.no,
                left: item,
                right: ChartItem::none(),
            };
            process_edge(
                new_item,
                new_edge,
                &mut agenda,
                &mut chart,
                &viterbi,
                opts.whitelist.as_ref(),
                opts.splitprune,
                grammar.fanout(rule.lhs),
                opts.exhaustive,
                &mut stats,
            );
        }

        // Binary, item as left child.
        for rule in grammar.lbinary(item.label) {
            if rule.rhs1 != item.label {
                break;
            }
            let Some(siblings) = by_label.get(&rule.rhs2) else { continue };
            for &sibling in siblings {
                if !concat(rule, item.span, sibling.span) {
                    continue;
                }
                let new_span = item.span.union(&sibling.span);
                if !beam_admit(&mut beam_histogram, new_span, opts.beamwidth) {
                    continue;
                }
                let sib_edge = viterbi[&sibling];
                let inside = rule.prob + edge.inside + sib_edge.inside;
                let score = match &opts.estimates {
                    Some(est) => est.score(rule.lhs, &new_span, inside, n),
                    None => inside,
                };
                if score > INF_DROP_THRESHOLD {
                    continue;
                }
                let new_item = ChartItem::new(rule.lhs, new_span);
                let new_edge = Edge {
                    score,
                    inside,
                    prob: rule.prob,
                    rule_id: rule.no,
                    left: item,
                    right: sibling,
                };
                process_edge(
                    new_item,
                    new_edge,
                    &mut agenda,
                    &mut chart,
                    &viterbi,
                    opts.whitelist.as_ref(),
                    opts.splitprune,
                    grammar.fanout(rule.lhs),
                    opts.exhaustive,
                    &mut stats,
                );
            }
        }

        // Binary, item as right child.
        for rule in grammar.rbinary(item.label) {
            if rule.rhs2 != item.label {
                break;
            }
            let Some(siblings) = by_label.get(&rule.rhs1) else { continue };
            for &sibling in siblings {
                if !concat(rule, sibling.span, item.span) {
                    continue;
                }
                let new_span = sibling.span.union(&item.span);
                if !beam_admit(&mut beam_histogram, new_span, opts.beamwidth) {
                    continue;
                }
                let sib_edge = viterbi[&sibling];
                let inside = rule.prob + sib_edge.inside + edge.inside;
                let score = match &opts.estimates {
                    Some(est) => est.score(rule.lhs, &new_span, inside, n),
                    None => inside,
                };
                if score > INF_DROP_THRESHOLD {
                    continue;
                }
                let new_item = ChartItem::new(rule.lhs, new_span);
                let new_edge = Edge {
                    score,
                    inside,
                    prob: rule.prob,
                    rule_id: rule.no,
                    left: sibling,
                    right: item,
                };
                process_edge(
                    new_item,
                    new_edge,
                    &mut agenda,
                    &mut chart,
                    &viterbi,
                    opts.whitelist.as_ref(),
                    opts.splitprune,
                    grammar.fanout(rule.lhs),
                    opts.exhaustive,
                    &mut stats,
                );
            }
        }
    }

    stats.final_agenda = agenda.len();
    stats.labels_touched = by_label.len();

    if viterbi.contains_key(&goal) {
        Ok((chart, goal, stats.to_string()))
    } else {
        Ok((chart, ChartItem::none(), format!("no parse {stats}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{encode_yield_function, LexicalRule, SimpleGrammar};

    fn build_toy_grammar() -> (SimpleGrammar, Label) {
        // A small toy grammar over "Daruber muss nachgedacht werden" built
        // from nested plain-concatenation rules (X = muss+nachgedacht,
        // VP2 = Daruber+X, S = VP2+werden), chosen to exercise scan, unary
        // chaining through multiple agenda rounds, and binary expansion
        // in both the left- and right-child directions.
        let mut g = SimpleGrammar::new();
        let s = g.intern("S");
        let vp2 = g.intern("VP2");
        let vainf = g.intern("VAINF");
        g.set_fanout(vp2, 2);
        g.set_fanout(s, 1);
        g.set_fanout(vainf, 1);

        // VP2 -> "Daruber" "nachgedacht" (two lexical items forming a discontinuous VP2)
        g.add_lexical("Daruber", LexicalRule { lhs: g.intern("DA"), prob: 0.0 });
        g.add_lexical("nachgedacht", LexicalRule { lhs: g.intern("NG"), prob: 0.0 });
        g.add_lexical("muss", LexicalRule { lhs: g.intern("MUSS"), prob: 0.0 });
        g.add_lexical("werden", LexicalRule { lhs: vainf, prob: 0.0 });

        let da = g.toid("DA").unwrap();
        let ng = g.toid("NG").unwrap();
        let muss = g.toid("MUSS").unwrap();

        // X -> MUSS NG (plain concatenation), then VP2 -> DA X and S -> VP2 VAINF,
        // each also plain concatenation, chaining four binary/lexical levels.
        let x = g.intern("X");
        g.set_fanout(x, 1);
        let (xargs, xlengths) = encode_yield_function(&[&[0, 1]]);
        g.add_rule(Rule { lhs: x, rhs1: muss, rhs2: ng, args: xargs, lengths: xlengths, prob: 0.0, no: 0 });

        let (vargs, vlengths) = encode_yield_function(&[&[0, 1]]);
        g.add_rule(Rule { lhs: vp2, rhs1: da, rhs2: x, args: vargs, lengths: vlengths, prob: 0.0, no: 1 });

        let (sargs, slengths) = encode_yield_function(&[&[0, 1]]);
        g.add_rule(Rule { lhs: s, rhs1: vp2, rhs2: vainf, args: sargs, lengths: slengths, prob: std::f64::consts::LN_2, no: 2 });

        g.finish();
        (g, s)
    }

    #[test]
    fn parses_toy_sentence_and_reports_inside() {
        let (g, s) = build_toy_grammar();
        let sent: Vec<String> =
            ["Daruber", "muss", "nachgedacht", "werden"].iter().map(|s| s.to_string()).collect();
        let opts: ParseOptions<u64> = ParseOptions::default();
        let (chart, goal, _msg) = parse(&sent, &g, None, s, &opts).unwrap();
        assert!(!goal.is_none());
        let edge = chart[&goal].last().unwrap();
        assert!((edge.inside - std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn reports_uncovered_word() {
        let (g, s) = build_toy_grammar();
        let sent: Vec<String> = ["xyzzy"].iter().map(|s| s.to_string()).collect();
        let opts: ParseOptions<u64> = ParseOptions::default();
        let (_chart, goal, msg) = parse(&sent, &g, None, s, &opts).unwrap();
        assert!(goal.is_none());
        assert!(msg.starts_with("not covered"));
    }

    #[test]
    fn reports_no_parse_on_bad_word_order() {
        let (g, s) = build_toy_grammar();
        let sent: Vec<String> =
            ["muss", "Daruber", "nachgedacht", "werden"].iter().map(|s| s.to_string()).collect();
        let opts: ParseOptions<u64> = ParseOptions::default();
        let (_chart, goal, msg) = parse(&sent, &g, None, s, &opts).unwrap();
        assert!(goal.is_none());
        assert!(msg.starts_with("no parse"));
    }

    #[test]
    fn rejects_sentence_beyond_max_length() {
        let (g, s) = build_toy_grammar();
        let sent: Vec<String> = vec!["werden".to_string(); MAX_SENTENCE_LEN + 1];
        let opts: ParseOptions<WideSpan> = ParseOptions::default();
        assert!(parse(&sent, &g, None, s, &opts).is_err());
    }

    #[test]
    fn concat_rejects_overlapping_spans() {
        let (args, lengths) = encode_yield_function(&[&[0, 1]]);
        let rule = Rule { lhs: 1, rhs1: 2, rhs2: 3, args, lengths, prob: 0.0, no: 0 };
        assert!(!concat(&rule, 0b011u64, 0b001u64));
    }

    #[test]
    fn concat_accepts_plain_contiguous_concatenation() {
        let (args, lengths) = encode_yield_function(&[&[0, 1]]);
        let rule = Rule { lhs: 1, rhs1: 2, rhs2: 3, args, lengths, prob: 0.0, no: 0 };
        assert!(concat(&rule, 0b011u64, 0b100u64));
        assert!(!concat(&rule, 0b011u64, 0b1000u64));
    }

    #[test]
    fn concat_requires_gap_at_argument_boundary() {
        // Yield ((0,1),(0,)): argument 0 is lvec{0} followed directly by
        // rvec{1} (no gap within an argument), then a real gap at position
        // 2, then argument 1 is lvec{3}.
        let (args, lengths) = encode_yield_function(&[&[0, 1], &[0]]);
        let rule = Rule { lhs: 1, rhs1: 2, rhs2: 3, args, lengths, prob: 0.0, no: 0 };
        let lvec = 0b1001u64; // positions 0 and 3
        let rvec = 0b0010u64; // position 1
        assert!(concat(&rule, lvec, rvec));
        // Without the gap at position 2 (lvec covers {0,2,3} contiguously
        // with rvec{1}), the same yield function must reject: there is no
        // discontinuity for the declared argument boundary to land on.
        let lvec_no_gap = 0b1101u64;
        assert!(!concat(&rule, lvec_no_gap, rvec));
    }
}
