/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

//! Agenda-driven chart parser for probabilistic LCFRS (and its monotone-CFG
//! special case) with a lazy k-best derivation enumerator.
//!
//! The crate does no I/O and owns no grammar storage of its own: callers
//! implement [`grammar::Grammar`] (or use the bundled [`grammar::SimpleGrammar`])
//! and hand it plus a tokenized sentence to [`lcfrs::parse`] or [`cfg::cfgparse`].
//! Both return a finished chart that [`kbest::kbest`] can then enumerate
//! derivations over.

pub mod agenda;
pub mod bits;
pub mod cfg;
pub mod estimate;
pub mod grammar;
pub mod item;
pub mod kbest;
pub mod lcfrs;
pub mod whitelist;

/// Re-exports covering the common parse-then-enumerate path.
pub mod prelude {
    pub use crate::bits::{SpanOps, WideSpan, MAX_SENTENCE_LEN};
    pub use crate::cfg::{cfgparse, CfgChart, CfgEdge};
    pub use crate::estimate::{EstimateKind, Estimates};
    pub use crate::grammar::{Grammar, Label, LexicalRule, Rule, SimpleGrammar, EPSILON};
    pub use crate::item::{ChartItem, Edge};
    pub use crate::kbest::{kbest, CfgHypergraph, Hypergraph, LcfrsHypergraph};
    pub use crate::lcfrs::{parse, parse_auto, Chart, ParseOptions, ParseOutcome, ParseStats};
    pub use crate::whitelist::{Whitelist, WhitelistEntry};
}
