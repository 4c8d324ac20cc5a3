//! Fleet scope index: per-dimension reverse maps over the application collection.
//! Rebuilt wholesale whenever the collection changes; queries never mutate it.

#![forbid(unsafe_code)]

use fleet_core::{Application, Dimension, ScopeSet, Selection};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

type ActiveScopes<'s> = SmallVec<[(Dimension, &'s ScopeSet); 4]>;

#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    total: usize,
    name_to_pos: FxHashMap<String, usize>,
    // dimension value -> positions in collection order, one map per Dimension::slot
    by_dim: [FxHashMap<String, Vec<usize>>; 4],
    // sorted-unique values per Dimension::slot
    values: [Vec<String>; 4],
}

impl ScopeIndex {
    /// Single pass over `apps`. Absent and empty dimension values are skipped.
    pub fn build(apps: &[Application]) -> Self {
        let t0 = std::time::Instant::now();
        let mut name_to_pos: FxHashMap<String, usize> = FxHashMap::default();
        name_to_pos.reserve(apps.len());
        let mut by_dim: [FxHashMap<String, Vec<usize>>; 4] = Default::default();

        for (pos, app) in apps.iter().enumerate() {
            name_to_pos.insert(app.name.clone(), pos);
            for dim in Dimension::ALL {
                if let Some(v) = app.dimension(dim) {
                    by_dim[dim.slot()].entry(v.to_string()).or_default().push(pos);
                }
            }
        }

        let mut values: [Vec<String>; 4] = Default::default();
        for dim in Dimension::ALL {
            let mut vals: Vec<String> = by_dim[dim.slot()].keys().cloned().collect();
            vals.sort();
            values[dim.slot()] = vals;
        }

        metrics::gauge!("scope_index_apps", apps.len() as f64);
        metrics::histogram!("scope_index_build_ms", t0.elapsed().as_secs_f64() * 1_000.0);
        debug!(
            apps = apps.len(),
            clusters = values[0].len(),
            namespaces = values[1].len(),
            projects = values[2].len(),
            appsets = values[3].len(),
            took_ms = %t0.elapsed().as_millis(),
            "index: build ok"
        );
        Self { total: apps.len(), name_to_pos, by_dim, values }
    }

    /// Application count at build time.
    pub fn total(&self) -> usize { self.total }

    pub fn position(&self, name: &str) -> Option<usize> { self.name_to_pos.get(name).copied() }

    /// Sorted-unique values of `dim` across the whole collection.
    pub fn values(&self, dim: Dimension) -> &[String] { &self.values[dim.slot()] }

    /// Positions holding `value` for `dim`, in collection order.
    pub fn positions(&self, dim: Dimension, value: &str) -> &[usize] {
        self.by_dim[dim.slot()].get(value).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Case-insensitive lookup of a known value, returning its canonical spelling.
    pub fn canonical(&self, dim: Dimension, value: &str) -> Option<&str> {
        self.values[dim.slot()].iter().find(|v| v.eq_ignore_ascii_case(value)).map(|v| v.as_str())
    }

    pub fn scoped_namespaces(&self, apps: &[Application], clusters: &ScopeSet) -> Vec<String> {
        self.scoped_values(apps, Dimension::Namespace, &[(Dimension::Cluster, clusters)])
    }

    pub fn scoped_projects(&self, apps: &[Application], clusters: &ScopeSet, namespaces: &ScopeSet) -> Vec<String> {
        self.scoped_values(
            apps,
            Dimension::Project,
            &[(Dimension::Cluster, clusters), (Dimension::Namespace, namespaces)],
        )
    }

    /// Application sets reachable under the cluster, namespace and project scopes.
    pub fn scoped_application_sets(&self, apps: &[Application], sel: &Selection) -> Vec<String> {
        self.scoped_values(
            apps,
            Dimension::ApplicationSet,
            &[
                (Dimension::Cluster, &sel.clusters),
                (Dimension::Namespace, &sel.namespaces),
                (Dimension::Project, &sel.projects),
            ],
        )
    }

    /// Applications matching every non-empty scope of `sel`, in collection order.
    /// Values OR within a dimension; dimensions AND together.
    pub fn scoped_applications<'a>(&self, apps: &'a [Application], sel: &Selection) -> Vec<&'a Application> {
        let active: ActiveScopes<'_> = Dimension::ALL
            .iter()
            .map(|d| (*d, sel.scope(*d)))
            .filter(|(_, s)| !s.is_empty())
            .collect();
        match self.mask(&active) {
            None => apps.iter().collect(),
            Some(mask) => mask
                .iter()
                .enumerate()
                .filter(|(_, hit)| **hit)
                .filter_map(|(pos, _)| apps.get(pos))
                .collect(),
        }
    }

    fn scoped_values(&self, apps: &[Application], target: Dimension, scopes: &[(Dimension, &ScopeSet)]) -> Vec<String> {
        let active: ActiveScopes<'_> = scopes.iter().filter(|(_, s)| !s.is_empty()).copied().collect();
        let Some(mask) = self.mask(&active) else {
            return self.values(target).to_vec();
        };
        let mut out: Vec<String> = mask
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .filter_map(|(pos, _)| apps.get(pos))
            .filter_map(|a| a.dimension(target))
            .map(|v| v.to_string())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Boolean mask over indexed positions, or `None` when no scope is active.
    fn mask(&self, active: &[(Dimension, &ScopeSet)]) -> Option<Vec<bool>> {
        if active.is_empty() { return None; }
        let mut running = vec![true; self.total];
        let mut local = vec![false; self.total];
        for (dim, scope) in active {
            local.iter_mut().for_each(|b| *b = false);
            for value in scope.iter() {
                for &pos in self.positions(*dim, value) {
                    if pos < self.total { local[pos] = true; }
                }
            }
            for (r, l) in running.iter_mut().zip(local.iter()) { *r = *r && *l; }
        }
        Some(running)
    }
}

/// Scoped applications tolerating a missing index: no index means no filtering.
pub fn scoped_applications<'a>(index: Option<&ScopeIndex>, apps: &'a [Application], sel: &Selection) -> Vec<&'a Application> {
    match index {
        Some(idx) => idx.scoped_applications(apps, sel),
        None => apps.iter().collect(),
    }
}

pub fn scoped_namespaces(index: Option<&ScopeIndex>, apps: &[Application], clusters: &ScopeSet) -> Vec<String> {
    index.map(|idx| idx.scoped_namespaces(apps, clusters)).unwrap_or_default()
}

pub fn scoped_projects(index: Option<&ScopeIndex>, apps: &[Application], clusters: &ScopeSet, namespaces: &ScopeSet) -> Vec<String> {
    index.map(|idx| idx.scoped_projects(apps, clusters, namespaces)).unwrap_or_default()
}

pub fn scoped_application_sets(index: Option<&ScopeIndex>, apps: &[Application], sel: &Selection) -> Vec<String> {
    index.map(|idx| idx.scoped_application_sets(apps, sel)).unwrap_or_default()
}

pub fn clusters(index: Option<&ScopeIndex>) -> Vec<String> {
    index.map(|idx| idx.values(Dimension::Cluster).to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, cluster: Option<&str>, ns: Option<&str>, project: Option<&str>) -> Application {
        let mut a = Application::new(name);
        a.cluster = cluster.map(str::to_string);
        a.namespace = ns.map(str::to_string);
        a.project = project.map(str::to_string);
        a
    }

    fn fleet() -> Vec<Application> {
        vec![
            app("api", Some("prod"), Some("web"), Some("core")),
            app("batch", Some("dev"), Some("jobs"), Some("data")),
            app("cache", Some("prod"), Some("infra"), Some("core")),
            app("docs", Some(""), Some("web"), None),
            app("etl", Some("prod"), Some("jobs"), Some("data")),
        ]
    }

    fn names(v: &[&Application]) -> Vec<String> { v.iter().map(|a| a.name.clone()).collect() }

    #[test]
    fn build_counts_and_positions_every_name_once() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        assert_eq!(idx.total(), apps.len());
        for (pos, a) in apps.iter().enumerate() {
            assert_eq!(idx.position(&a.name), Some(pos));
        }
        assert_eq!(idx.position("missing"), None);
    }

    #[test]
    fn value_lists_are_sorted_unique_without_empties() {
        let idx = ScopeIndex::build(&fleet());
        assert_eq!(idx.values(Dimension::Cluster), &["dev".to_string(), "prod".to_string()]);
        assert_eq!(idx.values(Dimension::Namespace), &["infra".to_string(), "jobs".to_string(), "web".to_string()]);
        assert!(idx.positions(Dimension::Cluster, "").is_empty());
        assert!(idx.values(Dimension::ApplicationSet).is_empty());
    }

    #[test]
    fn reverse_map_keeps_collection_order() {
        let idx = ScopeIndex::build(&fleet());
        assert_eq!(idx.positions(Dimension::Cluster, "prod"), &[0, 2, 4]);
        assert_eq!(idx.positions(Dimension::Namespace, "web"), &[0, 3]);
    }

    #[test]
    fn unscoped_selection_returns_input_unchanged() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        let got = idx.scoped_applications(&apps, &Selection::default());
        assert_eq!(got.len(), apps.len());
        assert!(got.iter().zip(apps.iter()).all(|(a, b)| std::ptr::eq(*a, b)));
    }

    #[test]
    fn cluster_scope_filters_in_order() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        let sel = Selection { clusters: ScopeSet::single("prod"), ..Default::default() };
        assert_eq!(names(&idx.scoped_applications(&apps, &sel)), vec!["api", "cache", "etl"]);
    }

    #[test]
    fn scopes_or_within_and_across_dimensions() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        let sel = Selection {
            clusters: ["prod", "dev"].into_iter().collect(),
            projects: ScopeSet::single("data"),
            ..Default::default()
        };
        assert_eq!(names(&idx.scoped_applications(&apps, &sel)), vec!["batch", "etl"]);
        let none = Selection { clusters: ScopeSet::single("staging"), ..Default::default() };
        assert!(idx.scoped_applications(&apps, &none).is_empty());
    }

    #[test]
    fn scoped_namespaces_fast_path_and_union() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        assert_eq!(idx.scoped_namespaces(&apps, &ScopeSet::new()), idx.values(Dimension::Namespace).to_vec());
        assert_eq!(
            idx.scoped_namespaces(&apps, &ScopeSet::single("prod")),
            vec!["infra".to_string(), "jobs".to_string(), "web".to_string()]
        );
        assert_eq!(idx.scoped_namespaces(&apps, &ScopeSet::single("dev")), vec!["jobs".to_string()]);
    }

    #[test]
    fn scoped_projects_intersects_two_dimensions() {
        let apps = fleet();
        let idx = ScopeIndex::build(&apps);
        let got = idx.scoped_projects(&apps, &ScopeSet::single("prod"), &ScopeSet::single("jobs"));
        assert_eq!(got, vec!["data".to_string()]);
        let web = idx.scoped_projects(&apps, &ScopeSet::new(), &ScopeSet::single("web"));
        assert_eq!(web, vec!["core".to_string()]);
    }

    #[test]
    fn namespaces_absent_everywhere_yield_empty() {
        let apps = vec![app("a", Some("c1"), None, None), app("b", Some("c1"), None, None), app("c", Some("c2"), None, None)];
        let idx = ScopeIndex::build(&apps);
        assert!(idx.scoped_namespaces(&apps, &ScopeSet::single("c1")).is_empty());
    }

    #[test]
    fn application_sets_respect_hierarchy_scopes() {
        let apps = vec![
            app("a", Some("prod"), None, None).with_application_set("web-set"),
            app("b", Some("dev"), None, None).with_application_set("batch-set"),
            app("c", Some("prod"), None, None),
        ];
        let idx = ScopeIndex::build(&apps);
        let sel = Selection { clusters: ScopeSet::single("prod"), ..Default::default() };
        assert_eq!(idx.scoped_application_sets(&apps, &sel), vec!["web-set".to_string()]);
        let by_set = Selection { application_sets: ScopeSet::single("batch-set"), ..Default::default() };
        assert_eq!(names(&idx.scoped_applications(&apps, &by_set)), vec!["b"]);
    }

    #[test]
    fn missing_index_is_passthrough() {
        let apps = fleet();
        let sel = Selection { clusters: ScopeSet::single("prod"), ..Default::default() };
        assert_eq!(scoped_applications(None, &apps, &sel).len(), apps.len());
        assert!(scoped_namespaces(None, &apps, &ScopeSet::single("prod")).is_empty());
        assert!(clusters(None).is_empty());
    }

    #[test]
    fn canonical_lookup_ignores_case() {
        let idx = ScopeIndex::build(&fleet());
        assert_eq!(idx.canonical(Dimension::Cluster, "PROD"), Some("prod"));
        assert_eq!(idx.canonical(Dimension::Cluster, "qa"), None);
    }
}
