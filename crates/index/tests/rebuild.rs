use fleet_core::{Application, Dimension, ScopeSet, Selection};
use fleet_index::ScopeIndex;

fn app(name: &str, cluster: &str, ns: &str) -> Application {
    Application::new(name).with_cluster(cluster).with_namespace(ns)
}

#[test]
fn rebuild_after_mutations_tracks_the_collection() {
    let mut apps = vec![app("a", "prod", "web"), app("b", "prod", "jobs"), app("c", "dev", "web")];
    let idx = ScopeIndex::build(&apps);
    assert_eq!(idx.positions(Dimension::Cluster, "prod"), &[0, 1]);

    // upsert moves b to dev, delete removes a
    let pos = idx.position("b").unwrap();
    apps[pos] = app("b", "dev", "jobs");
    apps.retain(|x| x.name != "a");
    let idx = ScopeIndex::build(&apps);

    assert_eq!(idx.total(), 2);
    assert_eq!(idx.values(Dimension::Cluster), &["dev".to_string()]);
    assert_eq!(idx.position("b"), Some(0));
    assert_eq!(idx.position("a"), None);

    let sel = Selection { clusters: ScopeSet::single("dev"), namespaces: ScopeSet::single("web"), ..Default::default() };
    let got: Vec<&str> = idx.scoped_applications(&apps, &sel).iter().map(|a| a.name.as_str()).collect();
    assert_eq!(got, vec!["c"]);
}

#[test]
fn stale_index_never_reads_past_the_collection() {
    let apps = vec![app("a", "prod", "web"), app("b", "prod", "web")];
    let idx = ScopeIndex::build(&apps);
    let shorter = &apps[..1];
    let sel = Selection { clusters: ScopeSet::single("prod"), ..Default::default() };
    assert_eq!(idx.scoped_applications(shorter, &sel).len(), 1);
    assert_eq!(idx.scoped_namespaces(shorter, &ScopeSet::single("prod")), vec!["web".to_string()]);
}
