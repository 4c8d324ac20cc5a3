#![forbid(unsafe_code)]

use fleet_core::{Dimension, Mode, View, VisibleRow};
use fleet_index as index;

use crate::state::State;

/// Rows for the current view before the text filter is applied. Apps follow the active sort.
pub fn base_rows(state: &State) -> Vec<VisibleRow> {
    let idx = state.index.as_ref();
    let sel = &state.selection;
    let labels = |values: Vec<String>| -> Vec<VisibleRow> { values.into_iter().map(VisibleRow::ScopeLabel).collect() };
    match state.nav.view {
        View::Clusters => labels(index::clusters(idx)),
        View::Namespaces => labels(index::scoped_namespaces(idx, &state.apps, &sel.clusters)),
        View::Projects => labels(index::scoped_projects(idx, &state.apps, &sel.clusters, &sel.namespaces)),
        View::ApplicationSets => labels(index::scoped_application_sets(idx, &state.apps, sel)),
        View::Apps => {
            let mut apps = index::scoped_applications(idx, &state.apps, sel);
            if let Some(sort) = state.ui.sort { sort.sort(&mut apps, |a| *a); }
            apps.into_iter().map(|a| VisibleRow::Application(a.clone())).collect()
        }
    }
}

/// The live query: the search text while typing, the committed filter otherwise.
pub fn filter_text(state: &State) -> &str {
    if state.mode == Mode::Search { &state.ui.search_query } else { &state.ui.active_filter }
}

/// Rows the cursor indexes into.
pub fn visible_rows(state: &State) -> Vec<VisibleRow> {
    let rows = base_rows(state);
    let needle = filter_text(state).trim().to_lowercase();
    if needle.is_empty() { return rows; }
    rows.into_iter().filter(|r| r.matches_text(&needle)).collect()
}

/// Known values for one dimension under the current parent scopes.
pub fn scoped_values(state: &State, dim: Dimension) -> Vec<String> {
    let idx = state.index.as_ref();
    let sel = &state.selection;
    match dim {
        Dimension::Cluster => index::clusters(idx),
        Dimension::Namespace => index::scoped_namespaces(idx, &state.apps, &sel.clusters),
        Dimension::Project => index::scoped_projects(idx, &state.apps, &sel.clusters, &sel.namespaces),
        Dimension::ApplicationSet => index::scoped_application_sets(idx, &state.apps, sel),
    }
}

/// Names of the applications in scope, ignoring the text filter.
pub fn scoped_app_names(state: &State) -> Vec<String> {
    index::scoped_applications(state.index.as_ref(), &state.apps, &state.selection)
        .into_iter()
        .map(|a| a.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{Application, ScopeSet, SortConfig, SortDirection, SortField};

    fn state() -> State {
        let mut s = State::default();
        s.replace_apps(vec![
            Application::new("billing").with_cluster("prod").with_namespace("pay").with_status("Synced", "Healthy"),
            Application::new("search").with_cluster("prod").with_namespace("web").with_status("OutOfSync", "Degraded"),
            Application::new("tools").with_cluster("dev").with_namespace("web"),
        ]);
        s
    }

    #[test]
    fn labels_follow_parent_scope() {
        let mut s = state();
        s.change_view(View::Namespaces);
        s.selection.clusters = ScopeSet::single("dev");
        let rows: Vec<String> = visible_rows(&s).iter().map(|r| r.label().to_string()).collect();
        assert_eq!(rows, vec!["web"]);
    }

    #[test]
    fn search_text_wins_while_typing() {
        let mut s = state();
        s.change_view(View::Apps);
        s.ui.active_filter = "billing".into();
        assert_eq!(visible_rows(&s).len(), 1);
        s.mode = Mode::Search;
        s.ui.search_query = "DEGR".into();
        let rows = visible_rows(&s);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label(), "search");
    }

    #[test]
    fn sort_applies_after_scoping_and_before_the_filter() {
        let mut s = state();
        s.change_view(View::Apps);
        let order = |s: &State| visible_rows(s).iter().map(|r| r.label().to_string()).collect::<Vec<_>>();
        assert_eq!(order(&s), vec!["billing", "search", "tools"]);
        s.ui.sort = Some(SortConfig { field: SortField::Health, direction: SortDirection::Asc });
        assert_eq!(order(&s), vec!["search", "tools", "billing"]);
        s.selection.clusters = ScopeSet::single("prod");
        s.ui.sort = Some(SortConfig { field: SortField::Name, direction: SortDirection::Desc });
        assert_eq!(order(&s), vec!["search", "billing"]);
        s.ui.active_filter = "bill".into();
        assert_eq!(order(&s), vec!["billing"]);
    }

    #[test]
    fn label_filter_is_case_insensitive() {
        let mut s = state();
        s.ui.active_filter = "PR".into();
        assert_eq!(visible_rows(&s).iter().map(|r| r.label()).collect::<Vec<_>>(), vec!["prod"]);
    }
}
