//! Projection of a fix onto the waypoint graph.

use crate::geo::{nearest_point_on_segment, IndoorPosition, LocalFrame};
use crate::navigation::WaypointGraph;

/// Nearest point on any same-floor edge of `graph`.
///
/// Returns `None` when the floor has no edges.
#[must_use]
pub fn snap_to_graph(position: IndoorPosition, graph: &WaypointGraph) -> Option<IndoorPosition> {
    if !position.coordinate().is_valid() {
        return None;
    }
    let frame = LocalFrame::new(position.coordinate());
    let p = frame.to_local(position.coordinate());

    let (point, _) = graph
        .edges_on_floor(position.floor)
        .map(|(a, b)| {
            nearest_point_on_segment(
                p,
                frame.to_local(a.position.coordinate()),
                frame.to_local(b.position.coordinate()),
            )
        })
        .min_by(|x, y| x.1.total_cmp(&y.1))?;

    let snapped = frame.to_geo(point);
    Some(IndoorPosition::new(snapped.latitude, snapped.longitude, position.floor))
}
