//! Authored waypoint graph.
//!
//! Waypoints are nodes; connections are undirected weighted edges. Same-floor
//! connections without an authored distance get the great-circle distance
//! between their endpoints. Floor transitions (stairs, elevators) must carry an
//! explicit distance.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::geo::{haversine_distance, IndoorPosition};

/// Errors raised while building a [`WaypointGraph`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Two waypoints share an id.
    #[error("Duplicate waypoint id: '{0}'")]
    DuplicateWaypoint(String),

    /// A connection points to a waypoint that does not exist.
    #[error("Waypoint '{from}' connects to unknown waypoint '{to}'")]
    UnknownWaypoint {
        /// Source waypoint id.
        from: String,
        /// Missing target id.
        to: String,
    },

    /// An edge weight is negative or not finite.
    #[error("Connection '{from}' -> '{to}' has invalid distance {distance}")]
    InvalidDistance {
        /// Source waypoint id.
        from: String,
        /// Target waypoint id.
        to: String,
        /// Offending distance.
        distance: f64,
    },

    /// A floor transition has no authored distance.
    #[error("Connection '{from}' -> '{to}' changes floor and needs an explicit distance")]
    MissingFloorTransitionDistance {
        /// Source waypoint id.
        from: String,
        /// Target waypoint id.
        to: String,
    },

    /// A waypoint has an invalid coordinate.
    #[error("Waypoint '{0}' has an invalid coordinate")]
    InvalidPosition(String),
}

/// Authored connection to another waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Connection {
    /// Target waypoint id.
    pub to: String,
    /// Walking distance in meters. Computed for same-floor connections if absent.
    #[serde(default)]
    pub distance: Option<f64>,
}

/// Authored waypoint as delivered by content sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WaypointRecord {
    /// Waypoint id, unique within the graph.
    #[schema(example = "wp-lobby")]
    pub id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Floor number.
    pub floor: i32,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Lobby")]
    pub name: Option<String>,
    /// Outgoing connections.
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// A node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Authored id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Position of the waypoint.
    pub position: IndoorPosition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Edge {
    pub to: usize,
    pub weight: f64,
}

/// Immutable weighted waypoint graph.
///
/// Node indices follow insertion order, which is also the tie-break order
/// used by the router.
#[derive(Debug, Clone, Default)]
pub struct WaypointGraph {
    nodes: Vec<GraphNode>,
    adjacency: Vec<Vec<Edge>>,
    index: HashMap<String, usize>,
}

impl WaypointGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from authored records.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] for duplicate ids, unknown targets, invalid
    /// coordinates or invalid distances.
    pub fn from_records(records: &[WaypointRecord]) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for record in records {
            let i = graph.add_waypoint(
                &record.id,
                IndoorPosition::new(record.latitude, record.longitude, record.floor),
            )?;
            graph.nodes[i].name.clone_from(&record.name);
        }
        for record in records {
            for connection in &record.connections {
                graph.connect(&record.id, &connection.to, connection.distance)?;
            }
        }
        Ok(graph)
    }

    /// Adds a waypoint and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateWaypoint`] or
    /// [`GraphError::InvalidPosition`].
    pub fn add_waypoint(&mut self, id: &str, position: IndoorPosition) -> Result<usize, GraphError> {
        if self.index.contains_key(id) {
            return Err(GraphError::DuplicateWaypoint(id.to_string()));
        }
        if !position.coordinate().is_valid() {
            return Err(GraphError::InvalidPosition(id.to_string()));
        }
        let i = self.nodes.len();
        self.nodes.push(GraphNode {
            id: id.to_string(),
            name: None,
            position,
        });
        self.adjacency.push(Vec::new());
        self.index.insert(id.to_string(), i);
        Ok(i)
    }

    /// Connects two waypoints in both directions.
    ///
    /// Connecting an already connected pair keeps the shorter distance.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] for unknown ids or invalid distances.
    pub fn connect(&mut self, from: &str, to: &str, distance: Option<f64>) -> Result<(), GraphError> {
        let unknown = || GraphError::UnknownWaypoint {
            from: from.to_string(),
            to: to.to_string(),
        };
        let a = *self.index.get(from).ok_or_else(unknown)?;
        let b = *self.index.get(to).ok_or_else(unknown)?;

        let (pa, pb) = (self.nodes[a].position, self.nodes[b].position);
        let weight = match distance {
            Some(d) => d,
            None if pa.floor == pb.floor => haversine_distance(pa.coordinate(), pb.coordinate())
                .map_err(|_| GraphError::InvalidPosition(from.to_string()))?,
            None => {
                return Err(GraphError::MissingFloorTransitionDistance {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidDistance {
                from: from.to_string(),
                to: to.to_string(),
                distance: weight,
            });
        }

        if a != b {
            self.upsert_edge(a, b, weight);
            self.upsert_edge(b, a, weight);
        }
        Ok(())
    }

    fn upsert_edge(&mut self, from: usize, to: usize, weight: f64) {
        let edges = &mut self.adjacency[from];
        match edges.iter_mut().find(|e| e.to == to) {
            Some(edge) => edge.weight = edge.weight.min(weight),
            None => edges.push(Edge { to, weight }),
        }
    }

    /// `true` if the graph has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of waypoints.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// All nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Looks up a node index by waypoint id.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn neighbors(&self, node: usize) -> &[Edge] {
        &self.adjacency[node]
    }

    /// Floors that have at least one waypoint.
    #[must_use]
    pub fn floors(&self) -> BTreeSet<i32> {
        self.nodes.iter().map(|n| n.position.floor).collect()
    }

    /// `true` if any waypoint lies on `floor`.
    #[must_use]
    pub fn has_floor(&self, floor: i32) -> bool {
        self.nodes.iter().any(|n| n.position.floor == floor)
    }

    /// Nearest waypoint on the same floor as `position`, with its distance.
    ///
    /// Ties go to the earlier-inserted waypoint.
    #[must_use]
    pub fn nearest_node(&self, position: &IndoorPosition) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.position.floor != position.floor {
                continue;
            }
            let Ok(d) = haversine_distance(position.coordinate(), node.position.coordinate()) else {
                continue;
            };
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        best
    }

    /// Same-floor edges on `floor`, each reported once as `(a, b)` with `a < b`.
    pub fn edges_on_floor(&self, floor: i32) -> impl Iterator<Item = (&GraphNode, &GraphNode)> + '_ {
        self.adjacency.iter().enumerate().flat_map(move |(a, edges)| {
            edges.iter().filter_map(move |edge| {
                let (na, nb) = (&self.nodes[a], &self.nodes[edge.to]);
                (a < edge.to && na.position.floor == floor && nb.position.floor == floor)
                    .then_some((na, nb))
            })
        })
    }
}
