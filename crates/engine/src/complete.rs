#![forbid(unsafe_code)]

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use fleet_core::{SortDirection, SortField};

use crate::command::{parse_verb, split, Verb, ALIASES};
use crate::state::State;
use crate::visible::{scoped_app_names, scoped_values};

/// Candidate completions for a partially typed command line.
///
/// A lone word completes against every verb alias by prefix. After a space the
/// argument completes against the scoped values for that verb, best fuzzy match first.
pub fn complete(state: &State, input: &str) -> Vec<String> {
    let line = input.trim_start().trim_start_matches(':');
    let (word, arg) = split(line);
    let typing_verb = !line.contains(char::is_whitespace);

    if typing_verb {
        let prefix = word.to_ascii_lowercase();
        let mut out: Vec<String> = ALIASES
            .iter()
            .map(|(alias, _)| *alias)
            .filter(|alias| alias.starts_with(&prefix))
            .map(str::to_string)
            .collect();
        out.sort();
        out.dedup();
        return out;
    }

    let Some(verb) = parse_verb(word) else { return Vec::new() };
    let pool = match verb {
        Verb::Level(dim) => scoped_values(state, dim),
        Verb::App
        | Verb::Sync
        | Verb::Diff
        | Verb::Rollback
        | Verb::Resources
        | Verb::Refresh { .. }
        | Verb::Delete => scoped_app_names(state),
        Verb::Sort => sort_orders(),
        _ => return Vec::new(),
    };
    rank(pool, arg.unwrap_or("")).into_iter().map(|c| format!("{word} {c}")).collect()
}

fn sort_orders() -> Vec<String> {
    SortField::ALL
        .into_iter()
        .flat_map(|f| SortDirection::ALL.into_iter().map(move |d| format!("{} {}", f.as_str(), d.as_str())))
        .collect()
}

fn rank(pool: Vec<String>, query: &str) -> Vec<String> {
    if query.is_empty() {
        let mut pool = pool;
        pool.sort();
        return pool;
    }
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, String)> = pool
        .into_iter()
        .filter_map(|c| matcher.fuzzy_match(&c, query).map(|s| (s, c)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{Application, ScopeSet};

    fn state() -> State {
        let mut s = State::default();
        s.replace_apps(vec![
            Application::new("payments-api").with_cluster("prod-eu").with_namespace("payments"),
            Application::new("search").with_cluster("prod-us").with_namespace("web"),
            Application::new("staging-web").with_cluster("staging").with_namespace("web"),
        ]);
        s
    }

    #[test]
    fn verbs_complete_by_prefix() {
        let s = state();
        assert_eq!(complete(&s, ":cl"), vec!["clear", "cls", "cluster", "clusters"]);
        assert_eq!(complete(&s, "rev"), vec!["revert"]);
        assert!(complete(&s, "zzz").is_empty());
    }

    #[test]
    fn arguments_rank_by_fuzzy_score() {
        let s = state();
        let got = complete(&s, "cluster prd");
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|c| c.starts_with("cluster prod-")));
        assert_eq!(complete(&s, "ns "), vec!["ns payments", "ns web"]);
    }

    #[test]
    fn arguments_respect_parent_scope() {
        let mut s = state();
        s.selection.clusters = ScopeSet::single("staging");
        assert_eq!(complete(&s, "ns "), vec!["ns web"]);
        assert_eq!(complete(&s, "sync "), vec!["sync staging-web"]);
        assert!(complete(&s, "logs x").is_empty());
        assert_eq!(complete(&s, "refresh! "), vec!["refresh! staging-web"]);
        assert_eq!(complete(&s, "del st"), vec!["del staging-web"]);
    }

    #[test]
    fn sort_completes_field_and_direction() {
        let s = state();
        assert_eq!(complete(&s, "sort ").len(), 6);
        assert_eq!(complete(&s, "sort ")[0], "sort health asc");
        let got = complete(&s, "sort heal");
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|c| c.starts_with("sort health ")));
    }
}
