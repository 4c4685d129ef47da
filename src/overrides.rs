// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type override directives.
//!
//! A plain-text format with one directive per line: `skip <name>` excludes
//! a type entirely, `replace <name> <with>` substitutes another type wherever
//! the first is referenced. Blank lines and `//` comments are ignored;
//! malformed lines are logged and dropped so a stray edit never fails a
//! build.

use crate::Str;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    skip: HashSet<Str>,
    replace: HashMap<Str, Str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Keep,
    Skip,
    Replace(Str),
}

impl Overrides {
    pub(crate) fn parse_into(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let mut words = line.split_whitespace();
            match words.next() {
                Some("skip") => match (words.next(), words.next()) {
                    (Some(name), None) => {
                        self.skip.insert(name.into());
                    }
                    _ => warn!(line, "malformed skip directive"),
                },
                Some("replace") => match (words.next(), words.next(), words.next()) {
                    (Some(name), Some(with), None) => {
                        self.replace.insert(name.into(), with.into());
                    }
                    _ => warn!(line, "malformed replace directive"),
                },
                _ => warn!(line, "unknown override directive"),
            }
        }
    }

    /// Skip takes precedence when a name appears in both tables.
    pub(crate) fn decide(&self, name: &str) -> Decision {
        if self.skip.contains(name) {
            return Decision::Skip;
        }
        match self.replace.get(name) {
            Some(with) => Decision::Replace(with.clone()),
            None => Decision::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Overrides {
        let mut overrides = Overrides::default();
        overrides.parse_into(text);
        overrides
    }

    #[test]
    fn parses_directives_and_ignores_noise() {
        let overrides = parse(
            "// types we never document\n\
             skip internal.Secret\n\
             \n\
             replace sql.NullString string\n\
             skip too many words here\n\
             frobnicate internal.Gadget\n",
        );
        assert_eq!(overrides.decide("internal.Secret"), Decision::Skip);
        assert_eq!(
            overrides.decide("sql.NullString"),
            Decision::Replace("string".into())
        );
        assert_eq!(overrides.decide("too"), Decision::Keep);
        assert_eq!(overrides.decide("internal.Gadget"), Decision::Keep);
    }

    #[test]
    fn skip_wins_over_replace() {
        let overrides = parse("replace a.T b.T\nskip a.T\n");
        assert_eq!(overrides.decide("a.T"), Decision::Skip);
    }

    #[test]
    fn later_directives_merge_into_earlier_ones() {
        let mut overrides = Overrides::default();
        overrides.parse_into("skip a.T\n");
        overrides.parse_into("replace b.T c.T\n");
        assert_eq!(overrides.decide("a.T"), Decision::Skip);
        assert_eq!(overrides.decide("b.T"), Decision::Replace("c.T".into()));
        assert_eq!(overrides.decide("user.User"), Decision::Keep);
    }
}
