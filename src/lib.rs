use itertools::Itertools;
use rand::Rng;
use rand::prelude::IndexedRandom;
use std::collections::HashSet;

/// Represents a 2D coordinate on the minesweeper board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

/// The visible state of a single cell on the board.
/// This is the only state the player (and the bot driver) gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Cell {
    Hidden,
    Revealed(u8), // The u8 is the number of adjacent mines.
}

/// Represents the current state of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GameState {
    Playing,
    Won,
    Lost,
}

/// All in-bounds cells within one row and one column of `of`, excluding `of`
/// itself. Handles board edges and corners.
fn neighbors(width: usize, height: usize, of: Point) -> impl Iterator<Item = Point> {
    (-1isize..=1)
        .cartesian_product(-1isize..=1)
        .filter(|&offset| offset != (0, 0))
        .filter_map(move |(dx, dy)| {
            let nx = of.x as isize + dx;
            let ny = of.y as isize + dy;
            (nx >= 0 && nx < width as isize && ny >= 0 && ny < height as isize).then(|| Point {
                x: nx as usize,
                y: ny as usize,
            })
        })
}

// --- Board Oracle (ground truth, never consulted by the solver) ---

/// The hidden mine layout. The solver never sees this; only the game
/// orchestration layer queries it, one revealed cell at a time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Board {
    width: usize,
    height: usize,
    mines: HashSet<Point>,
}

impl Board {
    /// Places `num_mines` mines uniformly at random on a `width` x `height`
    /// board, resampling collisions until the layout is complete.
    pub fn generate<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        num_mines: usize,
        rng: &mut R,
    ) -> Self {
        if num_mines >= width * height {
            panic!("Total mines must be less than the number of cells on the board.");
        }
        let mut mines = HashSet::new();
        while mines.len() != num_mines {
            mines.insert(Point {
                x: rng.random_range(0..width),
                y: rng.random_range(0..height),
            });
        }
        Board {
            width,
            height,
            mines,
        }
    }

    /// Builds a board with a fixed mine layout, for tests and replays.
    pub fn with_mines(width: usize, height: usize, mines: HashSet<Point>) -> Self {
        assert!(
            mines.iter().all(|p| p.x < width && p.y < height),
            "Every mine must lie within the board bounds."
        );
        Board {
            width,
            height,
            mines,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn mine_count(&self) -> usize {
        self.mines.len()
    }

    pub fn is_mine(&self, cell: Point) -> bool {
        self.mines.contains(&cell)
    }

    /// The true number of mines within one row and column of `cell`, not
    /// including the cell itself. This is the value fed to the solver when
    /// the cell is revealed.
    pub fn neighbor_mine_count(&self, cell: Point) -> u8 {
        neighbors(self.width, self.height, cell)
            .filter(|n| self.is_mine(*n))
            .count() as u8
    }
}

// --- Constraints (logical statements about the board) ---

/// A logical statement about the board: exactly `count` of `cells` are mines,
/// and the rest are safe.
///
/// Two constraints are equal iff their cell sets and counts are equal; the
/// solver relies on this to suppress duplicates during derivation. Every
/// constraint owns its cell set outright, so shrinking one can never corrupt
/// another.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Constraint {
    cells: HashSet<Point>,
    count: usize,
}

impl Constraint {
    /// Creates a constraint, rejecting counts that exceed the cell set.
    pub fn new(cells: HashSet<Point>, count: usize) -> anyhow::Result<Self> {
        if count > cells.len() {
            anyhow::bail!("count_overflow");
        }
        Ok(Constraint { cells, count })
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The full cell set, if every member is known to be a mine.
    pub fn known_mines(&self) -> Option<&HashSet<Point>> {
        (!self.cells.is_empty() && self.count == self.cells.len()).then_some(&self.cells)
    }

    /// The full cell set, if every member is known to be safe.
    pub fn known_safes(&self) -> Option<&HashSet<Point>> {
        (self.count == 0).then_some(&self.cells)
    }

    /// Removes a cell proven to be a mine, accounting for it in the count.
    /// No-op if the cell is not a member. Errs if the count would go
    /// negative, meaning the caller's facts contradict this constraint.
    pub fn mark_mine(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.cells.remove(&cell) {
            self.count = self
                .count
                .checked_sub(1)
                .ok_or(anyhow::anyhow!("count_underflow"))?;
        }
        Ok(())
    }

    /// Removes a cell proven to be safe. No-op if the cell is not a member.
    /// Errs if the count no longer fits in the remaining cells.
    pub fn mark_safe(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.cells.remove(&cell) && self.count > self.cells.len() {
            anyhow::bail!("count_overflow");
        }
        Ok(())
    }

    pub fn is_subset_of(&self, other: &Constraint) -> bool {
        self.cells.is_subset(&other.cells)
    }

    /// The constraint implied by subtracting a subset constraint from this
    /// one: its cells minus `other`'s, its count minus `other`'s. The result
    /// owns a fresh cell set. Errs on logically inconsistent inputs.
    pub fn difference(&self, other: &Constraint) -> anyhow::Result<Constraint> {
        let cells = self.cells.difference(&other.cells).copied().collect();
        let count = self
            .count
            .checked_sub(other.count)
            .ok_or(anyhow::anyhow!("count_underflow"))?;
        Constraint::new(cells, count)
    }
}

// --- Inference Engine ---

/// The deduction engine. It accumulates constraints from revealed cells and
/// propagates them to a fixpoint, growing its sets of proven-safe and
/// proven-mine cells. It works purely by logical entailment: a cell enters
/// `safes` or `mines` only when the accumulated constraints force it.
///
/// All three sets grow monotonically for the lifetime of one game; a new
/// game gets a fresh solver.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Solver {
    width: usize,
    height: usize,
    /// Cells the caller has already revealed.
    moves_made: HashSet<Point>,
    /// Cells proven not to be mines.
    safes: HashSet<Point>,
    /// Cells proven to be mines.
    mines: HashSet<Point>,
    /// Live constraints. A constraint is dropped the instant it resolves.
    constraints: Vec<Constraint>,
}

impl Solver {
    pub fn new(width: usize, height: usize) -> Self {
        if width == 0 || height == 0 {
            panic!("Board dimensions must be at least 1x1.");
        }
        Solver {
            width,
            height,
            moves_made: HashSet::new(),
            safes: HashSet::new(),
            mines: HashSet::new(),
            constraints: Vec::new(),
        }
    }

    pub fn known_safes(&self) -> &HashSet<Point> {
        &self.safes
    }

    pub fn known_mines(&self) -> &HashSet<Point> {
        &self.mines
    }

    /// The primary entry point, called once per revealed cell with the
    /// oracle's neighbor mine count for that cell.
    ///
    /// Records the move, certifies the cell safe, builds one new constraint
    /// from the cell's unresolved neighbors, and propagates to a fixpoint.
    /// Errs on out-of-bounds cells, repeated observations, and counts that
    /// contradict established facts; after such an error the knowledge base
    /// must be considered poisoned.
    pub fn observe(&mut self, cell: Point, count: u8) -> anyhow::Result<()> {
        // --- 1. Pre-checks ---
        if !self.in_bounds(cell) {
            anyhow::bail!("cell_out_of_bounds");
        }
        if self.moves_made.contains(&cell) {
            anyhow::bail!("cell_already_observed");
        }

        // --- 2. Record the move; a cell with a reported count is safe ---
        self.assert_safe(cell)?;
        self.moves_made.insert(cell);

        // --- 3. Partition the neighborhood against existing knowledge ---
        // Known-safe neighbors carry no information; known mines are already
        // accounted for, so each one shrinks the reported count.
        let mut count = usize::from(count);
        let mut unresolved = HashSet::new();
        for neighbor in neighbors(self.width, self.height, cell) {
            if self.safes.contains(&neighbor) {
                continue;
            }
            if self.mines.contains(&neighbor) {
                count = count
                    .checked_sub(1)
                    .ok_or(anyhow::anyhow!("count_underflow"))?;
                continue;
            }
            unresolved.insert(neighbor);
        }

        // --- 4. Assert the new constraint, unless it is vacuous ---
        if !unresolved.is_empty() || count > 0 {
            self.constraints.push(Constraint::new(unresolved, count)?);
        }

        // --- 5. Deduce everything the new fact implies ---
        self.propagate()
    }

    /// Marks a cell as a proven mine and folds the fact into every live
    /// constraint. Idempotent. Errs only when the fact contradicts the
    /// knowledge base, which is a caller contract violation.
    pub fn mark_mine(&mut self, cell: Point) -> anyhow::Result<()> {
        if !self.in_bounds(cell) {
            anyhow::bail!("cell_out_of_bounds");
        }
        self.assert_mine(cell)?;
        self.propagate()
    }

    /// Marks a cell as proven safe and folds the fact into every live
    /// constraint. Idempotent. Errs only on contradiction.
    pub fn mark_safe(&mut self, cell: Point) -> anyhow::Result<()> {
        if !self.in_bounds(cell) {
            anyhow::bail!("cell_out_of_bounds");
        }
        self.assert_safe(cell)?;
        self.propagate()
    }

    /// A cell proven safe that has not been played yet, or `None` if no such
    /// cell exists. Picks the lowest coordinate so callers can reproduce
    /// runs. Never mutates the knowledge base.
    pub fn safe_move(&self) -> Option<Point> {
        self.safes.difference(&self.moves_made).min().copied()
    }

    /// A uniformly random cell that has not been played and is not a known
    /// mine, or `None` if no such cell exists. Never mutates the knowledge
    /// base; determinism is up to the injected generator.
    pub fn random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Point> {
        let candidates = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Point { x, y }))
            .filter(|p| !self.moves_made.contains(p) && !self.mines.contains(p))
            .collect_vec();
        candidates.choose(rng).copied()
    }

    fn in_bounds(&self, cell: Point) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// Records a mine fact and scrubs it from every live constraint, without
    /// propagating further.
    fn assert_mine(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.safes.contains(&cell) {
            anyhow::bail!("state_collision");
        }
        if self.mines.insert(cell) {
            for constraint in &mut self.constraints {
                constraint.mark_mine(cell)?;
            }
        }
        Ok(())
    }

    /// Records a safe fact and scrubs it from every live constraint, without
    /// propagating further.
    fn assert_safe(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.mines.contains(&cell) {
            anyhow::bail!("state_collision");
        }
        if self.safes.insert(cell) {
            for constraint in &mut self.constraints {
                constraint.mark_safe(cell)?;
            }
        }
        Ok(())
    }

    /// Runs resolution and subset-derivation passes until a full pass
    /// changes nothing. Each pass either resolves (and removes) a constraint
    /// or adds a strictly smaller derived one, so the loop terminates on any
    /// finite board.
    fn propagate(&mut self) -> anyhow::Result<()> {
        let mut changed = true;
        while changed {
            changed = self.resolve_constraints()?;
            changed |= self.derive_constraints()?;
        }
        Ok(())
    }

    /// One resolution pass: fold facts learned since each constraint was
    /// created into it, then retire every constraint that has become
    /// vacuous, fully mined, or fully safe, transferring its cells into the
    /// proven sets.
    fn resolve_constraints(&mut self) -> anyhow::Result<bool> {
        let mut changed = false;
        let mut i = 0;
        while i < self.constraints.len() {
            let stale = self.constraints[i]
                .cells
                .iter()
                .filter(|&p| self.safes.contains(p) || self.mines.contains(p))
                .copied()
                .collect_vec();
            for cell in stale {
                if self.mines.contains(&cell) {
                    self.constraints[i].mark_mine(cell)?;
                } else {
                    self.constraints[i].mark_safe(cell)?;
                }
                changed = true;
            }

            if self.constraints[i].is_empty() {
                // Vacuously true; carries no information.
                self.constraints.swap_remove(i);
                continue;
            }

            let constraint = &self.constraints[i];
            let resolved = if constraint.known_mines().is_some() {
                Some((constraint.cells.clone(), true))
            } else if constraint.known_safes().is_some() {
                Some((constraint.cells.clone(), false))
            } else {
                None
            };
            if let Some((cells, is_mine)) = resolved {
                self.constraints.swap_remove(i);
                for cell in cells {
                    if is_mine {
                        self.assert_mine(cell)?;
                    } else {
                        self.assert_safe(cell)?;
                    }
                }
                changed = true;
                continue;
            }

            i += 1;
        }
        Ok(changed)
    }

    /// One subset-derivation pass: for every pair of live constraints where
    /// one's cells contain the other's, the difference is itself a valid
    /// constraint. New derivations are added unless already present by
    /// value.
    fn derive_constraints(&mut self) -> anyhow::Result<bool> {
        let mut derived: Vec<Constraint> = Vec::new();
        for (i, sub) in self.constraints.iter().enumerate() {
            for (j, sup) in self.constraints.iter().enumerate() {
                if i == j || sub.is_empty() || !sub.is_subset_of(sup) {
                    continue;
                }
                let implied = sup.difference(sub)?;
                if implied.is_empty() {
                    continue;
                }
                if !self.constraints.contains(&implied) && !derived.contains(&implied) {
                    derived.push(implied);
                }
            }
        }
        let changed = !derived.is_empty();
        self.constraints.extend(derived);
        Ok(changed)
    }
}

// --- Game Implementation (orchestrating the logic) ---

/// The main game struct, composing the ground-truth board, the visible grid,
/// and the deduction engine.
///
/// The solver never touches the board directly: every piece of information
/// it receives flows through `reveal_cell`, one cell and one neighbor count
/// at a time.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Game {
    board: Board,
    /// The visible state of the board, row-major.
    visible: Vec<Vec<Cell>>,
    solver: Solver,
    game_state: GameState,
}

impl Game {
    pub fn new<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        num_mines: usize,
        rng: &mut R,
    ) -> Self {
        Game::with_board(Board::generate(width, height, num_mines, rng))
    }

    /// Starts a game over a fixed board, for tests and replays.
    pub fn with_board(board: Board) -> Self {
        Game {
            visible: vec![vec![Cell::Hidden; board.width()]; board.height()],
            solver: Solver::new(board.width(), board.height()),
            game_state: GameState::Playing,
            board,
        }
    }

    /// Deserializes a game snapshot from bytes.
    pub fn deserialize(bts: &[u8]) -> Self {
        bcs::from_bytes(bts).unwrap()
    }

    /// Serializes the game snapshot to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        bcs::to_bytes(self).unwrap()
    }

    pub fn width(&self) -> usize {
        self.board.width()
    }

    pub fn height(&self) -> usize {
        self.board.height()
    }

    pub fn total_mines(&self) -> usize {
        self.board.mine_count()
    }

    pub fn cell(&self, at: Point) -> Cell {
        self.visible[at.y][at.x]
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// The primary function called to reveal a cell.
    ///
    /// Returns `Ok(false)` when the cell was a mine (the game is lost),
    /// `Ok(true)` otherwise. Revealing an already-revealed cell is a no-op.
    /// One cell per call; the solver's own propagation supplies the cascade
    /// a flood fill would.
    pub fn reveal_cell(&mut self, at: Point) -> anyhow::Result<bool> {
        // --- 1. Pre-checks ---
        if at.x >= self.board.width() || at.y >= self.board.height() {
            anyhow::bail!("cell_out_of_bounds");
        }
        if !matches!(self.visible[at.y][at.x], Cell::Hidden) {
            return Ok(true);
        }
        if self.game_state != GameState::Playing {
            anyhow::bail!("game_ended");
        }

        // --- 2. Consult the oracle ---
        if self.board.is_mine(at) {
            self.game_state = GameState::Lost;
            return Ok(false);
        }

        // --- 3. Reveal and feed the solver ---
        let count = self.board.neighbor_mine_count(at);
        self.visible[at.y][at.x] = Cell::Revealed(count);
        self.solver.observe(at, count)?;

        // --- 4. Check for a win ---
        if self.check_win_condition() {
            self.game_state = GameState::Won;
        }

        Ok(true)
    }

    /// The game is won once the solver has proven every mine, or every
    /// non-mine cell has been revealed.
    pub fn check_win_condition(&self) -> bool {
        if self.solver.known_mines().len() == self.board.mine_count() {
            return true;
        }
        let hidden = self
            .visible
            .iter()
            .flatten()
            .filter(|c| matches!(c, Cell::Hidden))
            .count();
        hidden == self.board.mine_count()
    }
}
