//! Static map representation and the precomputed enemy path.
//!
//! Maps are authored as ASCII rows:
//!
//! | Char | Terrain | Walkable | Buildable |
//! |------|---------|----------|-----------|
//! | `.`  | ground  | no       | yes       |
//! | `=`  | road    | yes      | yes, unless on the path |
//! | `#`  | rock    | no       | no        |
//! | `S`  | spawn   | yes      | no        |
//! | `B`  | base    | yes      | no        |
//!
//! Terrain never changes during a run, so the path is computed once in
//! [`GameMap::parse`].

use serde::{Deserialize, Serialize};

use crate::entities::GridPos;
use crate::error::{GameError, PlacementError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::pathfinding::find_path;

/// Cell terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    /// Open buildable ground.
    Ground,
    /// Walkable road.
    Road,
    /// Impassable rock.
    Rock,
    /// Enemy entry point.
    Spawn,
    /// The defended base.
    Base,
}

impl Terrain {
    /// Parse a map character.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Self::Ground),
            '=' => Some(Self::Road),
            '#' => Some(Self::Rock),
            'S' => Some(Self::Spawn),
            'B' => Some(Self::Base),
            _ => None,
        }
    }

    /// Map character for this terrain.
    #[must_use]
    pub const fn to_char(self) -> char {
        match self {
            Self::Ground => '.',
            Self::Road => '=',
            Self::Rock => '#',
            Self::Spawn => 'S',
            Self::Base => 'B',
        }
    }

    /// Enemies may walk here.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Road | Self::Spawn | Self::Base)
    }

    /// Towers may stand here (path cells are excluded separately).
    #[must_use]
    pub const fn is_buildable(self) -> bool {
        matches!(self, Self::Ground | Self::Road)
    }
}

/// Row-major terrain grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    cells: Vec<Terrain>,
}

impl TerrainGrid {
    /// Build a grid from row-major cells.
    ///
    /// # Panics
    ///
    /// Panics if `cells.len() != width * height`.
    #[must_use]
    pub fn new(width: u32, height: u32, cells: Vec<Terrain>) -> Self {
        assert_eq!(
            cells.len(),
            (width as usize) * (height as usize),
            "TerrainGrid cell count must match dimensions"
        );
        Self {
            width,
            height,
            cells,
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, pos: GridPos) -> usize {
        (pos.y as usize) * (self.width as usize) + (pos.x as usize)
    }

    /// Check if a cell is inside the grid.
    #[must_use]
    pub const fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Terrain at a cell, `None` if out of bounds.
    #[must_use]
    pub fn get(&self, pos: GridPos) -> Option<Terrain> {
        self.in_bounds(pos).then(|| self.cells[self.index(pos)])
    }

    /// Check if enemies can walk a cell.
    #[must_use]
    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.get(pos).is_some_and(Terrain::is_walkable)
    }
}

/// Authoring format for maps (RON or built in code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDef {
    /// Display name.
    pub name: String,
    /// ASCII rows, top to bottom.
    pub rows: Vec<String>,
}

impl MapDef {
    /// Create a map definition from string rows.
    pub fn new(name: impl Into<String>, rows: &[&str]) -> Self {
        Self {
            name: name.into(),
            rows: rows.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    /// Parse a map definition from RON.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e| GameError::RulesetParse(e.to_string()))
    }

    /// The built-in winding map.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            "switchback",
            &[
                "S===........",
                "...=........",
                "...=..=====.",
                "...=..=...=.",
                "...====...=.",
                "..........=.",
                "#.........=B",
            ],
        )
    }
}

/// A validated map with its precomputed enemy path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    name: String,
    grid: TerrainGrid,
    spawn: GridPos,
    base: GridPos,
    path: Vec<GridPos>,
    /// Row-major flags marking path cells.
    on_path: Vec<bool>,
}

impl GameMap {
    /// Validate a definition and compute its path.
    ///
    /// # Errors
    ///
    /// `GameError::InvalidMap` if the rows are empty or ragged, contain an
    /// unknown character, do not have exactly one spawn and one base, or
    /// have no walkable route from spawn to base.
    pub fn parse(def: &MapDef) -> Result<Self> {
        let height = def.rows.len();
        let width = def.rows.first().map_or(0, |r| r.chars().count());
        if height == 0 || width == 0 {
            return Err(GameError::InvalidMap(format!("map '{}' is empty", def.name)));
        }

        let mut cells = Vec::with_capacity(width * height);
        let mut spawns = Vec::new();
        let mut bases = Vec::new();

        for (y, row) in def.rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(GameError::InvalidMap(format!(
                    "map '{}' row {y} has width {}, expected {width}",
                    def.name,
                    row.chars().count()
                )));
            }
            for (x, c) in row.chars().enumerate() {
                let terrain = Terrain::from_char(c).ok_or_else(|| {
                    GameError::InvalidMap(format!(
                        "map '{}' has unknown cell '{c}' at ({x}, {y})",
                        def.name
                    ))
                })?;
                let pos = GridPos::new(to_u32(x)?, to_u32(y)?);
                match terrain {
                    Terrain::Spawn => spawns.push(pos),
                    Terrain::Base => bases.push(pos),
                    _ => {}
                }
                cells.push(terrain);
            }
        }

        let (&[spawn], &[base]) = (spawns.as_slice(), bases.as_slice()) else {
            return Err(GameError::InvalidMap(format!(
                "map '{}' needs exactly one spawn and one base (found {} and {})",
                def.name,
                spawns.len(),
                bases.len()
            )));
        };

        let grid = TerrainGrid::new(to_u32(width)?, to_u32(height)?, cells);
        let path = find_path(&grid, spawn, base)?;

        let mut on_path = vec![false; width * height];
        for cell in &path {
            on_path[grid.index(*cell)] = true;
        }

        tracing::debug!(map = %def.name, path_len = path.len(), "Map loaded");

        Ok(Self {
            name: def.name.clone(),
            grid,
            spawn,
            base,
            path,
            on_path,
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Terrain grid.
    #[must_use]
    pub const fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    /// Spawn cell.
    #[must_use]
    pub const fn spawn(&self) -> GridPos {
        self.spawn
    }

    /// Base cell.
    #[must_use]
    pub const fn base(&self) -> GridPos {
        self.base
    }

    /// Enemy path, spawn first, base last.
    #[must_use]
    pub fn path(&self) -> &[GridPos] {
        &self.path
    }

    /// Check if a cell lies on the enemy path.
    #[must_use]
    pub fn is_on_path(&self, pos: GridPos) -> bool {
        self.grid.in_bounds(pos) && self.on_path[self.grid.index(pos)]
    }

    /// Terrain-level placement check (ignores towers and money).
    pub fn check_buildable(&self, pos: GridPos) -> std::result::Result<(), PlacementError> {
        let terrain = self.grid.get(pos).ok_or(PlacementError::OutOfBounds)?;
        if self.is_on_path(pos) {
            return Err(PlacementError::OnPath);
        }
        if !terrain.is_buildable() {
            return Err(PlacementError::Blocked);
        }
        Ok(())
    }

    /// World position (cell units) for a path progress value.
    #[must_use]
    pub fn position_at(&self, index: u32, offset: Fixed) -> Vec2Fixed {
        let i = index as usize;
        let Some(here) = self.path.get(i) else {
            return self.base.center();
        };
        match self.path.get(i + 1) {
            Some(next) => here.center().lerp(next.center(), offset),
            None => here.center(),
        }
    }

    /// Render the map with path cells marked `*`.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        (0..self.grid.height)
            .map(|y| {
                (0..self.grid.width)
                    .map(|x| {
                        let pos = GridPos::new(x, y);
                        let terrain = self.grid.get(pos).unwrap_or(Terrain::Rock);
                        if self.is_on_path(pos) && terrain == Terrain::Road {
                            '*'
                        } else {
                            terrain.to_char()
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| GameError::InvalidMap(format!("map dimension {n} too large")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> MapDef {
        MapDef::new("corridor", &["......", "S====B", "......"])
    }

    #[test]
    fn test_parse_corridor() {
        let map = GameMap::parse(&corridor()).unwrap();
        assert_eq!(map.spawn(), GridPos::new(0, 1));
        assert_eq!(map.base(), GridPos::new(5, 1));
        assert_eq!(map.path().len(), 6);
        assert!(map.is_on_path(GridPos::new(3, 1)));
        assert!(!map.is_on_path(GridPos::new(3, 0)));
    }

    #[test]
    fn test_standard_map_path() {
        let map = GameMap::parse(&MapDef::standard()).unwrap();
        assert_eq!(map.path().len(), 22);
        assert_eq!(map.path().first(), Some(&map.spawn()));
        assert_eq!(map.path().last(), Some(&map.base()));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let def = MapDef::new("bad", &["S==B", "..."]);
        assert!(matches!(GameMap::parse(&def), Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_rejects_missing_base() {
        let def = MapDef::new("bad", &["S===="]);
        assert!(matches!(GameMap::parse(&def), Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_rejects_two_spawns() {
        let def = MapDef::new("bad", &["S==S=B"]);
        assert!(matches!(GameMap::parse(&def), Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_rejects_unknown_char() {
        let def = MapDef::new("bad", &["S=x=B"]);
        assert!(matches!(GameMap::parse(&def), Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_rejects_unreachable_base() {
        let def = MapDef::new("bad", &["S=#=B"]);
        assert!(matches!(GameMap::parse(&def), Err(GameError::InvalidMap(_))));
    }

    #[test]
    fn test_check_buildable() {
        let def = MapDef::new("mixed", &["..#.", "S==B", "...="]);
        let map = GameMap::parse(&def).unwrap();
        assert_eq!(map.check_buildable(GridPos::new(0, 0)), Ok(()));
        assert_eq!(
            map.check_buildable(GridPos::new(2, 0)),
            Err(PlacementError::Blocked)
        );
        assert_eq!(
            map.check_buildable(GridPos::new(1, 1)),
            Err(PlacementError::OnPath)
        );
        // Road off the path is buildable.
        assert_eq!(map.check_buildable(GridPos::new(3, 2)), Ok(()));
        assert_eq!(
            map.check_buildable(GridPos::new(9, 9)),
            Err(PlacementError::OutOfBounds)
        );
    }

    #[test]
    fn test_position_at_interpolates() {
        let map = GameMap::parse(&corridor()).unwrap();
        let pos = map.position_at(1, Fixed::from_num(0.5));
        assert_eq!(pos, Vec2Fixed::new(Fixed::from_num(1.5), Fixed::from_num(1)));
        assert_eq!(map.position_at(5, Fixed::ZERO), map.base().center());
    }

    #[test]
    fn test_render_marks_path() {
        let map = GameMap::parse(&corridor()).unwrap();
        assert_eq!(map.render()[1], "S****B");
    }

    #[test]
    fn test_map_def_from_ron() {
        let def = MapDef::from_ron_str(r#"(name: "tiny", rows: ["S=B"])"#).unwrap();
        assert_eq!(def.rows, vec!["S=B".to_string()]);
        assert!(GameMap::parse(&def).is_ok());
    }
}
