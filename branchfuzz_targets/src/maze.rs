//! Text mazes: parsing, BFS shortest path, path overlay, random generation.
//!
//! A maze is a rectangle of `#` (wall), `.` or space (open), one `S` and one
//! `F`. Any other character is tolerated as open floor but recorded as
//! `invalid_char`.

use branchfuzz_core::mutator::Generator;
use branchfuzz_core::target::{ExecContext, Target, TargetError};
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;

pub type Position = (usize, usize);

const WALL: char = '#';
const START: char = 'S';
const FINISH: char = 'F';
const PATH_MARK: char = '*';

fn maze_error(message: impl Into<String>) -> TargetError {
    TargetError::runtime("maze", message)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maze {
    grid: Vec<Vec<char>>,
    start: Position,
    finish: Position,
}

impl Maze {
    /// Parses a multi-line maze. Surrounding whitespace is ignored.
    pub fn parse(text: &str, ctx: &mut ExecContext<'_>) -> Result<Self, TargetError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            ctx.record("empty_input");
            return Err(maze_error("Maze input is empty."));
        }

        let mut grid = Vec::new();
        let mut start = None;
        let mut finish = None;
        let mut expected_len = None;

        for (r, line) in trimmed.split('\n').enumerate() {
            let row: Vec<char> = line.chars().collect();
            let expected = *expected_len.get_or_insert(row.len());
            if row.len() != expected {
                ctx.record("non_rectangular");
                return Err(maze_error("Maze is not rectangular."));
            }
            for (c, &ch) in row.iter().enumerate() {
                match ch {
                    START => {
                        if start.is_some() {
                            ctx.record("multiple_start");
                            return Err(maze_error("Multiple start points found."));
                        }
                        start = Some((r, c));
                        ctx.record("found_start");
                    }
                    FINISH => {
                        if finish.is_some() {
                            ctx.record("multiple_finish");
                            return Err(maze_error("Multiple finish points found."));
                        }
                        finish = Some((r, c));
                        ctx.record("found_finish");
                    }
                    WALL | '.' | ' ' => {}
                    _ => ctx.record("invalid_char"),
                }
            }
            grid.push(row);
        }

        let Some(start) = start else {
            ctx.record("no_start");
            return Err(maze_error("No start point found in maze."));
        };
        let Some(finish) = finish else {
            ctx.record("no_finish");
            return Err(maze_error("No finish point found in maze."));
        };

        ctx.record("maze_parsed");
        Ok(Self {
            grid,
            start,
            finish,
        })
    }

    pub fn rows(&self) -> usize {
        self.grid.len()
    }

    pub fn cols(&self) -> usize {
        self.grid.first().map_or(0, Vec::len)
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn finish(&self) -> Position {
        self.finish
    }

    fn neighbours(&self, (r, c): Position) -> impl Iterator<Item = Position> + '_ {
        let candidates = [
            r.checked_sub(1).map(|nr| (nr, c)),
            Some((r + 1, c)),
            c.checked_sub(1).map(|nc| (r, nc)),
            Some((r, c + 1)),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter(|&(nr, nc)| nr < self.rows() && nc < self.cols())
    }

    /// Breadth-first search from `S` to `F`, cells in walking order.
    pub fn shortest_path(
        &self,
        ctx: &mut ExecContext<'_>,
    ) -> Result<Option<Vec<Position>>, TargetError> {
        let cols = self.cols();
        let index = |(r, c): Position| r * cols + c;
        let mut parent: Vec<Option<Position>> = vec![None; self.rows() * cols];
        let mut visited = vec![false; self.rows() * cols];
        let mut queue = VecDeque::from([self.start]);
        visited[index(self.start)] = true;
        ctx.record("bfs_start");

        while let Some(current) = queue.pop_front() {
            ctx.checkpoint()?;
            if current == self.finish {
                ctx.record("path_found");
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(prev) = parent[index(cursor)] {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Ok(Some(path));
            }
            for next in self.neighbours(current) {
                if !visited[index(next)] && self.grid[next.0][next.1] != WALL {
                    visited[index(next)] = true;
                    parent[index(next)] = Some(current);
                    queue.push_back(next);
                    ctx.record("queue_append");
                }
            }
        }
        ctx.record("no_path");
        Ok(None)
    }

    /// The maze with every path cell other than `S` and `F` drawn as `*`.
    pub fn render_path(&self, path: Option<&[Position]>, ctx: &mut ExecContext<'_>) -> String {
        let mut visual = self.grid.clone();
        match path {
            Some(cells) if !cells.is_empty() => {
                for &(r, c) in cells {
                    if visual[r][c] != START && visual[r][c] != FINISH {
                        visual[r][c] = PATH_MARK;
                    }
                }
                ctx.record("visual_path");
            }
            _ => ctx.record("visual_no_path"),
        }
        visual
            .iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Maze {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.grid.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&row.iter().collect::<String>())?;
        }
        Ok(())
    }
}

/// Parses, solves and renders a maze per execution.
#[derive(Debug, Default)]
pub struct MazeTarget {
    last_rendering: Option<String>,
}

impl MazeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// The solved maze from the last execution that parsed.
    pub fn last_rendering(&self) -> Option<&str> {
        self.last_rendering.as_deref()
    }
}

impl Target<String> for MazeTarget {
    fn name(&self) -> &str {
        "maze"
    }

    fn execute(&mut self, input: &String, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        self.last_rendering = None;
        let maze = Maze::parse(input, ctx)?;
        let path = maze.shortest_path(ctx)?;
        self.last_rendering = Some(maze.render_path(path.as_deref(), ctx));
        Ok(())
    }
}

/// Random rectangular mazes, 3 to 10 rows and columns.
///
/// `S` and `F` land on random cells; when both pick the same cell only `S`
/// is placed. Other cells are wall, floor or space weighted 30/60/10.
#[derive(Debug, Clone, Copy, Default)]
pub struct MazeGenerator;

impl MazeGenerator {
    pub const MIN_SIDE: usize = 3;
    pub const MAX_SIDE: usize = 10;

    pub fn new() -> Self {
        MazeGenerator
    }

    fn cell<R: Rng + ?Sized>(rng: &mut R) -> char {
        match rng.random_range(0..100) {
            0..30 => WALL,
            30..90 => '.',
            _ => ' ',
        }
    }
}

impl<R: Rng + ?Sized> Generator<String, R> for MazeGenerator {
    fn generate(&mut self, rng: &mut R) -> String {
        let rows = rng.random_range(Self::MIN_SIDE..=Self::MAX_SIDE);
        let cols = rng.random_range(Self::MIN_SIDE..=Self::MAX_SIDE);
        let start = (rng.random_range(0..rows), rng.random_range(0..cols));
        let finish = (rng.random_range(0..rows), rng.random_range(0..cols));

        let mut text = String::with_capacity(rows * (cols + 1));
        for r in 0..rows {
            if r > 0 {
                text.push('\n');
            }
            for c in 0..cols {
                let ch = if (r, c) == start {
                    START
                } else if (r, c) == finish {
                    FINISH
                } else {
                    Self::cell(rng)
                };
                text.push(ch);
            }
        }
        text
    }
}
