//! Dijkstra over a [`WaypointGraph`] snapshot.
//!
//! The start and destination are attached to their nearest same-floor
//! waypoint by a straight-line leg, so a route can begin and end anywhere.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, instrument};

use super::graph::WaypointGraph;
use super::{NavigationError, NavigationResult, NavigationRoute, Waypoint};
use crate::geo::IndoorPosition;

/// Synthetic endpoints closer than this to their attached waypoint are merged
/// into it.
const MERGE_DISTANCE_M: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: usize,
}

impl Eq for State {}

// Min-heap on cost, then on insertion index.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Computes the shortest walking route between two indoor positions.
///
/// # Errors
///
/// - [`NavigationError::Other`] if either position has invalid coordinates
/// - [`NavigationError::NoData`] if the graph is empty or has no waypoint on a
///   requested floor
/// - [`NavigationError::NoPath`] if the two attachment waypoints are not
///   connected
#[instrument(skip(graph), fields(nodes = graph.node_count()))]
pub fn shortest_route(
    graph: &WaypointGraph,
    start: IndoorPosition,
    destination: IndoorPosition,
) -> NavigationResult<NavigationRoute> {
    for position in [&start, &destination] {
        if !position.coordinate().is_valid() {
            return Err(NavigationError::Other(format!(
                "invalid coordinate ({}, {})",
                position.latitude, position.longitude
            )));
        }
    }
    if graph.is_empty() {
        return Err(NavigationError::NoData("waypoint graph is empty".to_string()));
    }

    let (source, start_leg) = graph.nearest_node(&start).ok_or_else(|| {
        NavigationError::NoData(format!("no waypoints on floor {}", start.floor))
    })?;
    let (target, end_leg) = graph.nearest_node(&destination).ok_or_else(|| {
        NavigationError::NoData(format!("no waypoints on floor {}", destination.floor))
    })?;

    let path = dijkstra(graph, source, target).ok_or(NavigationError::NoPath {
        from_floor: start.floor,
        to_floor: destination.floor,
    })?;

    let route = assemble(graph, start, destination, start_leg, end_leg, &path);
    debug!(
        waypoints = route.waypoints.len(),
        total_distance = route.total_distance,
        "Route computed"
    );
    Ok(route)
}

/// Returns the node path from `source` to `target` with the weight of the edge
/// leading into each node (0 for `source`).
fn dijkstra(graph: &WaypointGraph, source: usize, target: usize) -> Option<Vec<(usize, f64)>> {
    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<(usize, f64)>> = vec![None; n];
    let mut heap = BinaryHeap::new();

    dist[source] = 0.0;
    heap.push(State {
        cost: 0.0,
        node: source,
    });

    while let Some(State { cost, node }) = heap.pop() {
        if node == target {
            break;
        }
        if cost > dist[node] {
            continue;
        }
        for edge in graph.neighbors(node) {
            let next = cost + edge.weight;
            if next < dist[edge.to] {
                dist[edge.to] = next;
                prev[edge.to] = Some((node, edge.weight));
                heap.push(State {
                    cost: next,
                    node: edge.to,
                });
            }
        }
    }

    if dist[target].is_infinite() {
        return None;
    }

    let mut path = Vec::new();
    let mut current = target;
    while let Some((parent, weight)) = prev[current] {
        path.push((current, weight));
        current = parent;
    }
    path.push((source, 0.0));
    path.reverse();
    Some(path)
}

fn assemble(
    graph: &WaypointGraph,
    start: IndoorPosition,
    destination: IndoorPosition,
    start_leg: f64,
    end_leg: f64,
    path: &[(usize, f64)],
) -> NavigationRoute {
    // (point, leg length from the previous point)
    let mut points: Vec<(Waypoint, f64)> = Vec::with_capacity(path.len() + 2);

    let synthetic = |p: IndoorPosition| Waypoint {
        latitude: p.latitude,
        longitude: p.longitude,
        floor: p.floor,
        distance_to_next: 0.0,
        waypoint_id: None,
        name: None,
    };

    points.push((synthetic(start), 0.0));
    for (i, &(node, weight)) in path.iter().enumerate() {
        let node = &graph.nodes()[node];
        let leg = if i == 0 { start_leg } else { weight };
        points.push((
            Waypoint {
                latitude: node.position.latitude,
                longitude: node.position.longitude,
                floor: node.position.floor,
                distance_to_next: 0.0,
                waypoint_id: Some(node.id.clone()),
                name: node.name.clone(),
            },
            leg,
        ));
    }
    points.push((synthetic(destination), end_leg));

    if start_leg < MERGE_DISTANCE_M {
        let (first, _) = points.remove(0);
        let (head, leg) = &mut points[0];
        head.latitude = first.latitude;
        head.longitude = first.longitude;
        *leg = 0.0;
    }
    if end_leg < MERGE_DISTANCE_M {
        if let Some((last, _)) = points.pop() {
            if let Some((tail, _)) = points.last_mut() {
                tail.latitude = last.latitude;
                tail.longitude = last.longitude;
            }
        }
    }

    let mut total_distance = 0.0;
    for i in 1..points.len() {
        let leg = points[i].1;
        points[i - 1].0.distance_to_next = leg;
        total_distance += leg;
    }

    NavigationRoute {
        waypoints: points.into_iter().map(|(waypoint, _)| waypoint).collect(),
        total_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{Connection, WaypointRecord};

    fn record(id: &str, lat: f64, lng: f64, floor: i32, connections: &[(&str, f64)]) -> WaypointRecord {
        WaypointRecord {
            id: id.to_string(),
            latitude: lat,
            longitude: lng,
            floor,
            name: None,
            connections: connections
                .iter()
                .map(|(to, d)| Connection {
                    to: (*to).to_string(),
                    distance: Some(*d),
                })
                .collect(),
        }
    }

    fn line_graph() -> WaypointGraph {
        WaypointGraph::from_records(&[
            record("S", 0.0, 0.0, 1, &[("M", 5.0)]),
            record("M", 5.0, 0.0, 1, &[("E", 5.0)]),
            record("E", 10.0, 0.0, 1, &[]),
        ])
        .unwrap()
    }

    fn ids(route: &NavigationRoute) -> Vec<Option<&str>> {
        route.waypoints.iter().map(|w| w.waypoint_id.as_deref()).collect()
    }

    #[test]
    fn test_route_waypoints_keep_authored_names() {
        let mut middle = record("M", 5.0, 0.0, 1, &[("E", 5.0)]);
        middle.name = Some("Atrium".into());
        let graph = WaypointGraph::from_records(&[
            record("S", 0.0, 0.0, 1, &[("M", 5.0)]),
            middle,
            record("E", 10.0, 0.0, 1, &[]),
        ])
        .unwrap();

        let route = shortest_route(
            &graph,
            IndoorPosition::new(0.0, 0.0, 1),
            IndoorPosition::new(10.0, 0.0, 1),
        )
        .unwrap();
        let names: Vec<Option<&str>> = route.waypoints.iter().map(|w| w.name.as_deref()).collect();
        assert_eq!(names, [None, Some("Atrium"), None]);
    }

    #[test]
    fn test_route_passes_through_middle_node() {
        let graph = line_graph();
        let route = shortest_route(
            &graph,
            IndoorPosition::new(0.0, 0.0, 1),
            IndoorPosition::new(10.0, 0.0, 1),
        )
        .unwrap();

        assert_eq!(ids(&route), [Some("S"), Some("M"), Some("E")]);
        assert!((route.total_distance - 10.0).abs() < 1e-9);
        assert_eq!(route.waypoints[0].distance_to_next, 5.0);
        assert_eq!(route.waypoints[2].distance_to_next, 0.0);
    }

    #[test]
    fn test_route_endpoints_match_requested_coordinates() {
        let graph = line_graph();
        let start = IndoorPosition::new(0.0, 0.0001, 1);
        let destination = IndoorPosition::new(10.0, 0.0001, 1);
        let route = shortest_route(&graph, start, destination).unwrap();

        assert_eq!(ids(&route), [None, Some("S"), Some("M"), Some("E"), None]);
        assert_eq!(route.waypoints.first().unwrap().position(), start);
        assert_eq!(route.waypoints.last().unwrap().position(), destination);

        let legs: f64 = route.waypoints.iter().map(|w| w.distance_to_next).sum();
        assert!((legs - route.total_distance).abs() < 1e-9);
        assert!(route.total_distance > 10.0);
    }

    #[test]
    fn test_disconnected_floors_return_no_path() {
        let graph = WaypointGraph::from_records(&[
            record("a", 0.0, 0.0, 0, &[("b", 3.0)]),
            record("b", 0.0, 0.001, 0, &[]),
            record("c", 0.0, 0.0, 2, &[]),
        ])
        .unwrap();

        let err = shortest_route(
            &graph,
            IndoorPosition::new(0.0, 0.0, 0),
            IndoorPosition::new(0.0, 0.0, 2),
        )
        .unwrap_err();
        assert_eq!(
            err,
            NavigationError::NoPath {
                from_floor: 0,
                to_floor: 2
            }
        );
    }

    #[test]
    fn test_route_crosses_floor_through_stairs() {
        let graph = WaypointGraph::from_records(&[
            record("lobby", 0.0, 0.0, 0, &[("stairs-0", 8.0)]),
            record("stairs-0", 0.0, 0.0001, 0, &[("stairs-1", 6.0)]),
            record("stairs-1", 0.0, 0.0001, 1, &[("office", 4.0)]),
            record("office", 0.0, 0.0002, 1, &[]),
        ])
        .unwrap();

        let route = shortest_route(
            &graph,
            IndoorPosition::new(0.0, 0.0, 0),
            IndoorPosition::new(0.0, 0.0002, 1),
        )
        .unwrap();
        assert_eq!(
            ids(&route),
            [Some("lobby"), Some("stairs-0"), Some("stairs-1"), Some("office")]
        );
        assert!((route.total_distance - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_equal_cost_paths_prefer_earlier_waypoints() {
        let graph = WaypointGraph::from_records(&[
            record("start", 0.0, 0.0, 0, &[("left", 1.0), ("right", 1.0)]),
            record("left", 0.001, 0.0, 0, &[("end", 1.0)]),
            record("right", -0.001, 0.0, 0, &[("end", 1.0)]),
            record("end", 0.0, 0.002, 0, &[]),
        ])
        .unwrap();

        for _ in 0..5 {
            let route = shortest_route(
                &graph,
                IndoorPosition::new(0.0, 0.0, 0),
                IndoorPosition::new(0.0, 0.002, 0),
            )
            .unwrap();
            assert_eq!(ids(&route)[1], Some("left"));
        }
    }

    #[test]
    fn test_missing_data_and_invalid_input() {
        let empty = WaypointGraph::new();
        assert!(matches!(
            shortest_route(&empty, IndoorPosition::new(0.0, 0.0, 0), IndoorPosition::new(0.0, 0.0, 0)),
            Err(NavigationError::NoData(_))
        ));

        let graph = line_graph();
        assert!(matches!(
            shortest_route(&graph, IndoorPosition::new(0.0, 0.0, 7), IndoorPosition::new(0.0, 0.0, 1)),
            Err(NavigationError::NoData(_))
        ));
        assert!(matches!(
            shortest_route(&graph, IndoorPosition::new(f64::NAN, 0.0, 1), IndoorPosition::new(0.0, 0.0, 1)),
            Err(NavigationError::Other(_))
        ));
    }
}
