//! Grid-based pathfinding using the A* algorithm.
//!
//! Enemies walk a single precomputed route from spawn to base. The route is
//! found once per map load over walkable terrain with 4-directional moves,
//! and ties are broken by cell coordinates so every client computes the
//! same path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::entities::GridPos;
use crate::error::{GameError, Result};
use crate::map::TerrainGrid;

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: GridPos,
    /// f_score = g_score + heuristic
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets for 4-directional movement.
const DIRECTIONS: [(i64, i64); 4] = [
    (1, 0),  // East
    (0, 1),  // South
    (-1, 0), // West
    (0, -1), // North
];

#[inline]
fn coords_to_tie_breaker(pos: GridPos) -> u64 {
    ((pos.y as u64) << 32) | (pos.x as u64)
}

/// Find the shortest walkable route from `start` to `goal`, inclusive of both.
///
/// # Errors
///
/// Returns `GameError::InvalidMap` if either endpoint is outside the grid or
/// not walkable, or if no route exists.
pub fn find_path(grid: &TerrainGrid, start: GridPos, goal: GridPos) -> Result<Vec<GridPos>> {
    if !grid.is_walkable(start) {
        return Err(GameError::InvalidMap(format!(
            "path start {start} is not walkable"
        )));
    }
    if !grid.is_walkable(goal) {
        return Err(GameError::InvalidMap(format!(
            "path goal {goal} is not walkable"
        )));
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();
    let mut g_score: HashMap<GridPos, u32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        pos: start,
        f_score: start.manhattan(goal),
        tie_breaker: coords_to_tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == goal {
            return Ok(reconstruct_path(&came_from, goal));
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);

        for &(dx, dy) in &DIRECTIONS {
            let nx = i64::from(current.pos.x) + dx;
            let ny = i64::from(current.pos.y) + dy;
            let (Ok(nx), Ok(ny)) = (u32::try_from(nx), u32::try_from(ny)) else {
                continue;
            };
            let neighbor = GridPos::new(nx, ny);

            if !grid.is_walkable(neighbor) {
                continue;
            }

            let tentative_g = current_g.saturating_add(1);
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(u32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.pos);
                g_score.insert(neighbor, tentative_g);
                open_set.push(AStarNode {
                    pos: neighbor,
                    f_score: tentative_g + neighbor.manhattan(goal),
                    tie_breaker: coords_to_tie_breaker(neighbor),
                });
            }
        }
    }

    Err(GameError::InvalidMap(format!(
        "no path from spawn {start} to base {goal}"
    )))
}

fn reconstruct_path(came_from: &HashMap<GridPos, GridPos>, goal: GridPos) -> Vec<GridPos> {
    let mut path = vec![goal];
    let mut current = goal;

    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Terrain;

    fn grid(rows: &[&str]) -> TerrainGrid {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let cells = rows
            .iter()
            .flat_map(|r| r.chars())
            .map(|c| Terrain::from_char(c).unwrap())
            .collect();
        TerrainGrid::new(width, height, cells)
    }

    fn assert_connected(path: &[GridPos]) {
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan(pair[1]), 1, "gap between {pair:?}");
        }
    }

    #[test]
    fn test_straight_corridor() {
        let g = grid(&["......", "S====B", "......"]);
        let path = find_path(&g, GridPos::new(0, 1), GridPos::new(5, 1)).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path[0], GridPos::new(0, 1));
        assert_eq!(path[5], GridPos::new(5, 1));
        assert_connected(&path);
    }

    #[test]
    fn test_winding_road() {
        let g = grid(&["S==.", "..=.", "..==", "...B"]);
        let path = find_path(&g, GridPos::new(0, 0), GridPos::new(3, 3)).unwrap();
        assert_connected(&path);
        assert_eq!(path.len(), 7);
        for cell in &path {
            assert!(g.is_walkable(*cell));
        }
    }

    #[test]
    fn test_picks_shortest_route() {
        // Two routes; the lower one is longer.
        let g = grid(&["S===B", "=...=", "=====",]);
        let path = find_path(&g, GridPos::new(0, 0), GridPos::new(4, 0)).unwrap();
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn test_no_path_exists() {
        let g = grid(&["S=#=B"]);
        let result = find_path(&g, GridPos::new(0, 0), GridPos::new(4, 0));
        assert!(matches!(result, Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_ground_is_not_walkable() {
        let g = grid(&["S=.=B"]);
        assert!(find_path(&g, GridPos::new(0, 0), GridPos::new(4, 0)).is_err());
    }

    #[test]
    fn test_determinism() {
        let g = grid(&["S===", "====", "===B"]);
        let a = find_path(&g, GridPos::new(0, 0), GridPos::new(3, 2)).unwrap();
        let b = find_path(&g, GridPos::new(0, 0), GridPos::new(3, 2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }
}
