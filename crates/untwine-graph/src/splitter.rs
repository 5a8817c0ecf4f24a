//! T1/T2/T3 region reduction and node splitting.
//!
//! The splitter reduces a rooted digraph by the classical interval rules:
//! T1 removes region self-edges, T2 merges a region into its sole
//! predecessor, and T3 — applied only when neither of the others made
//! progress — picks a cheapest multi-entry region and duplicates it once per
//! extra entry through [`SplitDigraph::clone_region`]. When the loop ends,
//! every loop in the graph has a single entry, i.e. the graph is reducible.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::{GraphError, InsertionLocation, SplitDigraph};

/// A group of vertices merged during reduction.
///
/// Regions partition the graph at all times. Edges between regions are the
/// quotient of the underlying edges by region membership, minus self-loops
/// once T1 has discharged them.
#[derive(Debug)]
struct Region<V> {
    members: BTreeSet<V>,
    preds: BTreeSet<usize>,
    succs: BTreeSet<usize>,
    alive: bool,
}

impl<V: Ord> Region<V> {
    fn singleton(v: V) -> Self {
        Self {
            members: BTreeSet::from([v]),
            preds: BTreeSet::new(),
            succs: BTreeSet::new(),
            alive: true,
        }
    }

    fn empty() -> Self {
        Self {
            members: BTreeSet::new(),
            preds: BTreeSet::new(),
            succs: BTreeSet::new(),
            alive: true,
        }
    }
}

/// Removes all irreducible loops from `graph` by node splitting.
///
/// Returns whether any duplication was performed. The graph is mutated in
/// place through its own [`SplitDigraph::clone_region`] hook; after a
/// successful return, rerunning the splitter performs no further
/// duplication.
pub fn split_irreducible<G: SplitDigraph>(graph: &mut G) -> Result<bool, GraphError> {
    let vertices = graph.vertices();
    if vertices.is_empty() {
        return Ok(false);
    }

    let mut regions: Vec<Region<G::Vertex>> = Vec::with_capacity(vertices.len());
    let mut region_of: HashMap<G::Vertex, usize> = HashMap::with_capacity(vertices.len());
    for &v in &vertices {
        region_of.insert(v, regions.len());
        regions.push(Region::singleton(v));
    }
    for &v in &vertices {
        let r = region_of[&v];
        for w in graph.successors(v) {
            let s = region_of[&w];
            regions[r].succs.insert(s);
            regions[s].preds.insert(r);
        }
    }

    let mut any_cloned = false;
    loop {
        let alive = regions.iter().filter(|r| r.alive).count();
        if alive <= 1 {
            break;
        }
        if regions
            .iter()
            .filter(|r| r.alive)
            .all(|r| r.preds.is_empty())
        {
            break;
        }

        let mut matched = false;

        // T1: discharge region self-edges.
        for i in 0..regions.len() {
            if regions[i].alive && regions[i].preds.contains(&i) {
                regions[i].preds.remove(&i);
                regions[i].succs.remove(&i);
                trace!(region = i, "T1: removed self edge");
                matched = true;
            }
        }

        // T2: merge every region with a single (distinct) predecessor.
        loop {
            let mut merged_any = false;
            for i in 0..regions.len() {
                if !regions[i].alive || regions[i].preds.len() != 1 {
                    continue;
                }
                let p = *regions[i].preds.iter().next().unwrap();
                if p == i {
                    continue;
                }
                merge_into(&mut regions, &mut region_of, p, i);
                trace!(region = i, into = p, "T2: merged");
                merged_any = true;
                matched = true;
            }
            if !merged_any {
                break;
            }
        }

        if matched {
            continue;
        }

        // T3: split the cheapest multi-entry region.
        let Some(target) = pick_split_target(&regions) else {
            break;
        };
        split_region(graph, &mut regions, &mut region_of, target)?;
        any_cloned = true;
        check_quotient(graph, &regions, &region_of)?;
    }

    Ok(any_cloned)
}

/// Merges region `r` (whose only predecessor is `p`) into `p`.
fn merge_into<V: Copy + Ord + std::hash::Hash>(
    regions: &mut [Region<V>],
    region_of: &mut HashMap<V, usize>,
    p: usize,
    r: usize,
) {
    let members = std::mem::take(&mut regions[r].members);
    let succs = std::mem::take(&mut regions[r].succs);
    regions[r].preds.clear();
    regions[r].alive = false;

    for &v in &members {
        region_of.insert(v, p);
    }
    regions[p].members.extend(members);

    for s in succs {
        regions[s].preds.remove(&r);
        if s != p {
            regions[s].preds.insert(p);
            regions[p].succs.insert(s);
        }
    }
    regions[p].succs.remove(&r);
    // An r -> p edge becomes internal to the merged region.
    regions[p].preds.remove(&r);
}

/// Picks the region to split: lowest weight `(|preds| - 1) * |members|`,
/// ties broken by lowest region index.
fn pick_split_target<V>(regions: &[Region<V>]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, region) in regions.iter().enumerate() {
        if !region.alive || region.preds.len() < 2 {
            continue;
        }
        let weight = (region.preds.len() - 1) * region.members.len();
        if best.map_or(true, |(_, w)| weight < w) {
            best = Some((i, weight));
        }
    }
    best.map(|(i, _)| i)
}

/// One T3 step: the lowest-index predecessor keeps the original region; every
/// other predecessor receives a private copy produced by the duplication
/// hook.
fn split_region<G: SplitDigraph>(
    graph: &mut G,
    regions: &mut Vec<Region<G::Vertex>>,
    region_of: &mut HashMap<G::Vertex, usize>,
    r: usize,
) -> Result<(), GraphError> {
    let preds: Vec<usize> = regions[r].preds.iter().copied().collect();
    let succs: Vec<usize> = regions[r].succs.iter().copied().collect();
    let members: Vec<G::Vertex> = regions[r].members.iter().copied().collect();
    debug_assert!(preds.len() >= 2);

    for &p in &preds[1..] {
        let fresh = regions.len();
        let mut region = Region::empty();
        region.preds.insert(p);
        region.succs.extend(succs.iter().copied());
        regions.push(region);

        let owned: Vec<G::Vertex> = regions[p].members.iter().copied().collect();
        debug!(
            region = r,
            owner = preds[0],
            pred = p,
            members = members.len(),
            "T3: duplicating region"
        );
        let added = graph.clone_region(&members, &owned)?;

        for (v, loc) in added {
            let home = match loc {
                InsertionLocation::Append => fresh,
                InsertionLocation::Before(anchor) | InsertionLocation::After(anchor) => *region_of
                    .get(&anchor)
                    .ok_or_else(|| GraphError::UnknownAnchor {
                        anchor: format!("{anchor:?}"),
                    })?,
            };
            regions[home].members.insert(v);
            region_of.insert(v, home);
        }

        regions[p].succs.remove(&r);
        regions[p].succs.insert(fresh);
        regions[r].preds.remove(&p);
        for &s in &succs {
            regions[s].preds.insert(fresh);
        }
    }

    Ok(())
}

/// Validates that region edges are exactly the quotient of the underlying
/// edges, self-loops excluded, and that regions still partition the graph.
///
/// This is the main defense against a duplication hook that breaks its
/// contract; any mismatch is reported loudly instead of silently producing a
/// wrong graph.
fn check_quotient<G: SplitDigraph>(
    graph: &G,
    regions: &[Region<G::Vertex>],
    region_of: &HashMap<G::Vertex, usize>,
) -> Result<(), GraphError> {
    let vertices = graph.vertices();
    let mut expected_succs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); regions.len()];
    let mut expected_preds: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); regions.len()];

    let mut seen = 0usize;
    for &v in &vertices {
        let r = *region_of
            .get(&v)
            .ok_or_else(|| GraphError::UnreportedVertex {
                vertex: format!("{v:?}"),
            })?;
        if !regions[r].alive || !regions[r].members.contains(&v) {
            return Err(GraphError::RegionEdgesDiverged {
                region: r,
                detail: format!("vertex {v:?} is not a member of its region"),
            });
        }
        seen += 1;
        for w in graph.successors(v) {
            let s = *region_of
                .get(&w)
                .ok_or_else(|| GraphError::UnreportedVertex {
                    vertex: format!("{w:?}"),
                })?;
            if s != r {
                expected_succs[r].insert(s);
                expected_preds[s].insert(r);
            }
        }
    }

    let member_total: usize = regions
        .iter()
        .filter(|r| r.alive)
        .map(|r| r.members.len())
        .sum();
    if member_total != seen {
        return Err(GraphError::RegionEdgesDiverged {
            region: 0,
            detail: format!(
                "regions hold {member_total} vertices, graph has {seen}"
            ),
        });
    }

    for (i, region) in regions.iter().enumerate() {
        if !region.alive {
            continue;
        }
        let actual_succs: BTreeSet<usize> =
            region.succs.iter().copied().filter(|&s| s != i).collect();
        if actual_succs != expected_succs[i] {
            return Err(GraphError::RegionEdgesDiverged {
                region: i,
                detail: format!(
                    "successors {:?} but underlying edges give {:?}",
                    actual_succs, expected_succs[i]
                ),
            });
        }
        let actual_preds: BTreeSet<usize> =
            region.preds.iter().copied().filter(|&p| p != i).collect();
        if actual_preds != expected_preds[i] {
            return Err(GraphError::RegionEdgesDiverged {
                region: i,
                detail: format!(
                    "predecessors {:?} but underlying edges give {:?}",
                    actual_preds, expected_preds[i]
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdjacencyGraph;

    fn graph(labels: &[&str], edges: &[(&str, &str)]) -> AdjacencyGraph {
        let mut g = AdjacencyGraph::new();
        for l in labels {
            g.add_vertex(*l);
        }
        for (a, b) in edges {
            let from = g.vertex(a).unwrap();
            let to = g.vertex(b).unwrap();
            g.add_edge(from, to);
        }
        g
    }

    fn assert_idempotent(g: &mut AdjacencyGraph) {
        let before = g.edge_labels();
        let cloned = split_irreducible(g).unwrap();
        assert!(!cloned, "second pass still duplicated");
        assert_eq!(g.edge_labels(), before, "second pass mutated the graph");
    }

    #[test]
    fn empty_graph_is_noop() {
        let mut g = AdjacencyGraph::new();
        assert!(!split_irreducible(&mut g).unwrap());
    }

    #[test]
    fn single_vertex_is_noop() {
        let mut g = graph(&["a"], &[]);
        assert!(!split_irreducible(&mut g).unwrap());
    }

    #[test]
    fn acyclic_graph_is_noop() {
        let mut g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert!(!split_irreducible(&mut g).unwrap());
        assert_eq!(g.len(), 4);
    }

    #[test]
    fn natural_loop_is_noop() {
        // a -> b -> c -> b is reducible: the loop has the single entry b.
        let mut g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        assert!(!split_irreducible(&mut g).unwrap());
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn two_entry_loop_duplicates_first_entry() {
        // Scenario: a->b->c->b with the side entry a->c. The loop {b, c} has
        // two entries; b is duplicated for the entry through c.
        let mut g = graph(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "b"), ("a", "c")],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(
            g.edge_labels(),
            vec!["a->b", "a->c", "b'->c", "b->c", "c->b'"]
        );
        assert_idempotent(&mut g);
    }

    #[test]
    fn daisy_chains_stay_untouched() {
        // Same two-entry loop, with an unrelated chain c->d->e and a->f.
        let mut g = graph(
            &["a", "b", "c", "d", "e", "f"],
            &[
                ("a", "b"),
                ("b", "c"),
                ("c", "b"),
                ("a", "c"),
                ("c", "d"),
                ("d", "e"),
                ("a", "f"),
            ],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(
            g.edge_labels(),
            vec![
                "a->b", "a->c", "a->f", "b'->c", "b->c", "c->b'", "c->d", "d->e"
            ]
        );
        assert_idempotent(&mut g);
    }

    #[test]
    fn weight_picks_the_cheaper_vertex() {
        // a->b->c->d->b with the side entry a->d: both the chain {b, c} and
        // {d} are entries of the loop, but duplicating d is cheaper.
        let mut g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "b"), ("a", "d")],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(
            g.edge_labels(),
            vec!["a->b", "a->d", "b->c", "c->d'", "d'->b", "d->b"]
        );
        assert_idempotent(&mut g);
    }

    #[test]
    fn doubly_irreducible_needs_two_splits() {
        // Two interlocking two-entry loops; both must be split.
        let mut g = graph(
            &["a", "b", "c", "d"],
            &[
                ("a", "b"),
                ("b", "c"),
                ("c", "b"),
                ("a", "d"),
                ("d", "b"),
                ("b", "d"),
                ("a", "c"),
            ],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(g.len(), 6);
        assert_eq!(
            g.edge_labels(),
            vec![
                "a->b", "a->c", "a->d", "b->c'", "b->d'", "c'->b", "c->b",
                "d'->b", "d->b"
            ]
        );
        assert_idempotent(&mut g);
    }

    #[test]
    fn self_loop_cluster() {
        // a->a; b->a; c->a: after T1 discharges the self edge, {a} still has
        // the two entries b and c; the copy keeps its own self loop.
        let mut g = graph(
            &["a", "b", "c"],
            &[("a", "a"), ("b", "a"), ("c", "a")],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(
            g.edge_labels(),
            vec!["a'->a'", "a->a", "b->a", "c->a'"]
        );
        assert_idempotent(&mut g);
    }

    #[test]
    fn chain_regions_duplicate_as_a_unit() {
        // Three 3-vertex chains shaped like the two-entry loop at the region
        // level; the middle chain is duplicated wholesale, preserving its
        // internal structure.
        let mut g = graph(
            &[
                "a1", "a2", "a3", "b1", "b2", "b3", "c1", "c2", "c3",
            ],
            &[
                ("a1", "a2"),
                ("a2", "a3"),
                ("b1", "b2"),
                ("b2", "b3"),
                ("c1", "c2"),
                ("c2", "c3"),
                ("a3", "b1"),
                ("b3", "c1"),
                ("c3", "b1"),
                ("a3", "c1"),
            ],
        );
        assert!(split_irreducible(&mut g).unwrap());
        assert_eq!(g.len(), 12);
        for (a, b) in [("b1'", "b2'"), ("b2'", "b3'")] {
            let from = g.vertex(a).unwrap();
            let to = g.vertex(b).unwrap();
            assert!(g.has_edge(from, to), "missing {a}->{b}");
        }
        let c3 = g.vertex("c3").unwrap();
        let b1c = g.vertex("b1'").unwrap();
        let b3c = g.vertex("b3'").unwrap();
        let c1 = g.vertex("c1").unwrap();
        let b1 = g.vertex("b1").unwrap();
        let a3 = g.vertex("a3").unwrap();
        assert!(g.has_edge(c3, b1c));
        assert!(!g.has_edge(c3, b1));
        assert!(g.has_edge(b3c, c1));
        assert!(g.has_edge(a3, b1));
        assert_idempotent(&mut g);
    }

    #[test]
    fn unreachable_cycle_is_still_reduced() {
        // The splitter works on the whole vertex set, not just what the root
        // reaches.
        let mut g = graph(
            &["r", "x", "y", "z"],
            &[("x", "y"), ("y", "x"), ("z", "y")],
        );
        // The x/y cycle only has the single entry y, so T1/T2 reduce it
        // without duplication even though r never reaches it.
        let cloned = split_irreducible(&mut g).unwrap();
        assert!(!cloned);
        assert_idempotent(&mut g);
    }
}
