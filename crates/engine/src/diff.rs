//! Diff session support: manifest cleanup, YAML rendering and a line-level diff.

#![forbid(unsafe_code)]

use fleet_api::ResourceDiff;
use serde::Serialize;
use serde_json::Value;

const NOISY_METADATA: &[&str] = &["creationTimestamp", "resourceVersion", "uid", "managedFields"];
const NOISY_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "deployment.kubernetes.io/revision",
];
const CONTAINER_LISTS: &[&str] = &["containers", "initContainers"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "text", rename_all = "kebab-case")]
pub enum DiffLine {
    Context(String),
    Removed(String),
    Added(String),
}

impl DiffLine {
    /// Unified-diff rendering: ` ` common, `-` live, `+` desired.
    pub fn render(&self) -> String {
        match self {
            DiffLine::Context(t) => format!(" {t}"),
            DiffLine::Removed(t) => format!("-{t}"),
            DiffLine::Added(t) => format!("+{t}"),
        }
    }

    pub fn is_change(&self) -> bool { !matches!(self, DiffLine::Context(_)) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    NoDocuments,
    Identical,
    Lines(Vec<DiffLine>),
}

/// Strip server-populated fields that make live and desired manifests differ for no reason.
pub fn clean_manifest(doc: &mut Value) {
    let Some(obj) = doc.as_object_mut() else { return };
    obj.remove("status");

    let mut drop_metadata = false;
    if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
        for k in NOISY_METADATA { meta.remove(*k); }
        let mut drop_annotations = false;
        if let Some(annos) = meta.get_mut("annotations").and_then(Value::as_object_mut) {
            for k in NOISY_ANNOTATIONS { annos.remove(*k); }
            drop_annotations = annos.is_empty();
        }
        if drop_annotations { meta.remove("annotations"); }
        drop_metadata = meta.is_empty();
    }
    if drop_metadata { obj.remove("metadata"); }

    if let Some(spec) = obj.get_mut("spec").and_then(Value::as_object_mut) {
        spec.remove("serviceAccount");
        clean_pod_spec(spec);
        if let Some(tpl_spec) = spec
            .get_mut("template")
            .and_then(|t| t.get_mut("spec"))
            .and_then(Value::as_object_mut)
        {
            tpl_spec.remove("serviceAccount");
            clean_pod_spec(tpl_spec);
        }
    }
}

fn clean_pod_spec(spec: &mut serde_json::Map<String, Value>) {
    for list in CONTAINER_LISTS {
        let Some(containers) = spec.get_mut(*list).and_then(Value::as_array_mut) else { continue };
        for c in containers.iter_mut().filter_map(Value::as_object_mut) {
            if c.get("imagePullPolicy").and_then(Value::as_str) == Some("IfNotPresent") {
                c.remove("imagePullPolicy");
            }
            c.remove("terminationMessagePath");
            c.remove("terminationMessagePolicy");
        }
    }
}

/// Parse a JSON (or YAML) manifest, clean it and render YAML. Unparseable input is returned as-is.
pub fn manifest_to_yaml(raw: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(raw).ok().or_else(|| serde_yaml::from_str(raw).ok());
    let Some(mut doc) = parsed else { return raw.to_string() };
    clean_manifest(&mut doc);
    serde_yaml::to_string(&doc).unwrap_or_else(|_| raw.to_string())
}

/// Build the live-vs-desired view for an application's managed resources.
/// Hooks are skipped; every other non-empty document takes part in the diff.
pub fn build(diffs: &[ResourceDiff]) -> DiffOutcome {
    let mut live_docs: Vec<String> = Vec::new();
    let mut desired_docs: Vec<String> = Vec::new();
    for d in diffs.iter().filter(|d| !d.hook) {
        let live = d.live_state.as_deref().filter(|s| !s.is_empty()).map(manifest_to_yaml).unwrap_or_default();
        let desired = d.target_state.as_deref().filter(|s| !s.is_empty()).map(manifest_to_yaml).unwrap_or_default();
        if !live.is_empty() { live_docs.push(live); }
        if !desired.is_empty() { desired_docs.push(desired); }
    }
    if live_docs.is_empty() && desired_docs.is_empty() {
        return DiffOutcome::NoDocuments;
    }
    let lines = line_diff(&live_docs.join("---\n"), &desired_docs.join("---\n"));
    if lines.iter().any(DiffLine::is_change) { DiffOutcome::Lines(lines) } else { DiffOutcome::Identical }
}

/// Longest-common-subsequence line diff. Common prefix and suffix are peeled off first.
pub fn line_diff(left: &str, right: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = left.lines().collect();
    let b: Vec<&str> = right.lines().collect();

    let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (am, bm) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    let mut out: Vec<DiffLine> = a[..prefix].iter().map(|l| DiffLine::Context(l.to_string())).collect();

    // lcs[i][j] = LCS length of am[i..] and bm[j..]
    let (n, m) = (am.len(), bm.len());
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if am[i] == bm[j] { lcs[i + 1][j + 1] + 1 } else { lcs[i + 1][j].max(lcs[i][j + 1]) };
        }
    }
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if am[i] == bm[j] {
            out.push(DiffLine::Context(am[i].to_string()));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(am[i].to_string()));
            i += 1;
        } else {
            out.push(DiffLine::Added(bm[j].to_string()));
            j += 1;
        }
    }
    out.extend(am[i..].iter().map(|l| DiffLine::Removed(l.to_string())));
    out.extend(bm[j..].iter().map(|l| DiffLine::Added(l.to_string())));
    out.extend(a[a.len() - suffix..].iter().map(|l| DiffLine::Context(l.to_string())));
    out
}
