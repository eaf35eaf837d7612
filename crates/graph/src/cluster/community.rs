//! Community detection over the Concept-entity subgraph. `detect` runs a
//! single-pass greedy modularity optimization (the Louvain "local moving"
//! phase, expressed without the aggregation phase — see DESIGN.md for why a
//! full Leiden implementation is out of this subsystem's reach) and falls
//! back to plain connected components when the subgraph carries no weight
//! at all to optimize against.

use petgraph::unionfind::UnionFind;
use std::collections::HashMap;
use uuid::Uuid;

pub struct CommunityResult {
    pub assignment: HashMap<Uuid, usize>,
    pub method: &'static str,
}

pub fn detect(nodes: &[Uuid], edges: &[(Uuid, Uuid, f32)]) -> CommunityResult {
    if edges.is_empty() {
        return CommunityResult { assignment: connected_components(nodes, edges), method: "connected_components" };
    }

    let index_of: HashMap<Uuid, usize> = nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let n = nodes.len();
    let mut adjacency: Vec<HashMap<usize, f32>> = vec![HashMap::new(); n];
    let mut total_weight = 0.0f32;

    for &(a, b, w) in edges {
        let (Some(&ia), Some(&ib)) = (index_of.get(&a), index_of.get(&b)) else { continue };
        if ia == ib || w <= 0.0 {
            continue;
        }
        *adjacency[ia].entry(ib).or_insert(0.0) += w;
        *adjacency[ib].entry(ia).or_insert(0.0) += w;
        total_weight += w;
    }

    if total_weight <= 0.0 {
        return CommunityResult { assignment: connected_components(nodes, edges), method: "connected_components" };
    }

    let degree: Vec<f32> = adjacency.iter().map(|m| m.values().sum()).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let two_m = 2.0 * total_weight;

    for _pass in 0..20 {
        let mut moved = false;

        for i in 0..n {
            let current = community[i];
            let mut weight_to_community: HashMap<usize, f32> = HashMap::new();
            for (&j, &w) in &adjacency[i] {
                *weight_to_community.entry(community[j]).or_insert(0.0) += w;
            }

            let mut community_degree_sum: HashMap<usize, f32> = HashMap::new();
            for (k, &comm) in community.iter().enumerate() {
                if k != i {
                    *community_degree_sum.entry(comm).or_insert(0.0) += degree[k];
                }
            }

            let mut best_community = current;
            let mut best_gain = 0.0f32;
            for (&comm, &w_to_comm) in &weight_to_community {
                if comm == current {
                    continue;
                }
                let comm_degree = community_degree_sum.get(&comm).copied().unwrap_or(0.0);
                let gain = w_to_comm - (comm_degree * degree[i]) / two_m;
                if gain > best_gain {
                    best_gain = gain;
                    best_community = comm;
                }
            }

            if best_community != current {
                community[i] = best_community;
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    CommunityResult { assignment: renumber(nodes, &community), method: "louvain" }
}

fn connected_components(nodes: &[Uuid], edges: &[(Uuid, Uuid, f32)]) -> HashMap<Uuid, usize> {
    let index_of: HashMap<Uuid, usize> = nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut uf = UnionFind::new(nodes.len().max(1));

    for &(a, b, _) in edges {
        if let (Some(&ia), Some(&ib)) = (index_of.get(&a), index_of.get(&b)) {
            uf.union(ia, ib);
        }
    }

    let labeling = uf.into_labeling();
    nodes.iter().enumerate().map(|(i, &id)| (id, labeling[i])).collect()
}

fn renumber(nodes: &[Uuid], community: &[usize]) -> HashMap<Uuid, usize> {
    let mut next_id = 0usize;
    let mut seen: HashMap<usize, usize> = HashMap::new();
    nodes
        .iter()
        .enumerate()
        .map(|(i, &id)| {
            let comm = community[i];
            let assigned = *seen.entry(comm).or_insert_with(|| {
                let v = next_id;
                next_id += 1;
                v
            });
            (id, assigned)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_disconnected_triangles_form_two_communities() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let d = Uuid::from_u128(4);
        let e = Uuid::from_u128(5);
        let f = Uuid::from_u128(6);

        let nodes = vec![a, b, c, d, e, f];
        let edges = vec![
            (a, b, 1.0), (b, c, 1.0), (a, c, 1.0),
            (d, e, 1.0), (e, f, 1.0), (d, f, 1.0),
        ];

        let result = detect(&nodes, &edges);
        assert_eq!(result.method, "louvain");
        assert_eq!(result.assignment[&a], result.assignment[&b]);
        assert_eq!(result.assignment[&b], result.assignment[&c]);
        assert_eq!(result.assignment[&d], result.assignment[&e]);
        assert_ne!(result.assignment[&a], result.assignment[&d]);
    }

    #[test]
    fn no_edges_falls_back_to_connected_components() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let result = detect(&[a, b], &[]);
        assert_eq!(result.method, "connected_components");
        assert_ne!(result.assignment[&a], result.assignment[&b]);
    }
}
