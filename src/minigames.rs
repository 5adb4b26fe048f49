//! Offline mini-games: word scramble, arithmetic quiz, memory sequence.
//!
//! These run entirely client-side with no backend round-trip. Each game is a
//! pure generator/checker pair over an injected [`Rng`], so rounds are
//! reproducible under a seeded generator. [`MinigameRound`] wraps the shared
//! per-round bookkeeping: a 60 second clock and a running score.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::timer::{Countdown, TickOutcome, TimeoutPolicy};

/// Seconds per mini-game round.
pub const ROUND_SECONDS: u32 = 60;
/// Points for an unscrambled word.
pub const WORD_POINTS: u32 = 10;
/// Points for a correct arithmetic answer.
pub const MATH_POINTS: u32 = 5;
/// Points per completed memory level, multiplied by the level number.
pub const MEMORY_POINTS_PER_LEVEL: u32 = 5;

/// Number of distinct pads in the memory game.
pub const MEMORY_PAD_COUNT: u8 = 4;

const WORDS: &[&str] = &[
    "programming",
    "computer",
    "developer",
    "intelligence",
    "database",
    "algorithm",
    "website",
    "software",
];

// ── Word scramble ───────────────────────────────────────────────────

/// A word with its letters shuffled; the player restores the original.
#[derive(Debug, Clone)]
pub struct WordPuzzle {
    word: String,
    scrambled: String,
}

impl WordPuzzle {
    /// Pick a word and scramble it. The scrambled form is guaranteed to
    /// differ from the original.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let word = WORDS
            .choose(rng)
            .copied()
            .unwrap_or("software")
            .to_string();
        let mut letters: Vec<char> = word.chars().collect();
        // A shuffle can land on the identity permutation; reshuffle until it
        // doesn't. Bounded so a pathological word cannot spin forever.
        for _ in 0..16 {
            letters.shuffle(rng);
            if letters.iter().collect::<String>() != word {
                break;
            }
        }
        let scrambled = letters.into_iter().collect();
        Self { word, scrambled }
    }

    pub fn scrambled(&self) -> &str {
        &self.scrambled
    }

    /// Whether `guess` restores the original word. Exact match, like the
    /// original game; no trimming or case folding.
    pub fn check(&self, guess: &str) -> bool {
        guess == self.word
    }

    /// The solution, for reveal-after-timeout displays.
    pub fn solution(&self) -> &str {
        &self.word
    }
}

// ── Arithmetic quiz ─────────────────────────────────────────────────

/// One arithmetic question. Subtraction operands are arranged so the answer
/// is never negative.
#[derive(Debug, Clone)]
pub struct MathQuiz {
    question: String,
    answer: i64,
}

impl MathQuiz {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let (a, b, op, answer) = match rng.gen_range(0..3) {
            0 => {
                let a = rng.gen_range(1..=50);
                let b = rng.gen_range(1..=50);
                (a, b, '+', a + b)
            }
            1 => {
                let a = rng.gen_range(25..=74);
                let b = rng.gen_range(1..=25);
                (a, b, '-', a - b)
            }
            _ => {
                let a = rng.gen_range(1..=12);
                let b = rng.gen_range(1..=12);
                (a, b, '*', a * b)
            }
        };
        Self {
            question: format!("{a} {op} {b} = ?"),
            answer,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn check(&self, answer: i64) -> bool {
        answer == self.answer
    }
}

// ── Memory sequence ─────────────────────────────────────────────────

/// Result of pressing one pad in the memory game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOutcome {
    /// Correct pad; the sequence is not yet complete.
    Advanced,
    /// The whole sequence was reproduced; points awarded, next level dealt
    /// via [`MemoryGame::deal`].
    LevelComplete { points: u32 },
    /// Wrong pad; the run is over.
    GameOver,
}

/// Repeat-the-sequence game. Each level's sequence has `level + 2` entries
/// drawn from [`MEMORY_PAD_COUNT`] pads; a single wrong press ends the run.
#[derive(Debug, Clone)]
pub struct MemoryGame {
    sequence: Vec<u8>,
    progress: usize,
    level: u32,
    game_over: bool,
}

impl MemoryGame {
    pub fn new() -> Self {
        Self {
            sequence: Vec::new(),
            progress: 0,
            level: 1,
            game_over: false,
        }
    }

    /// Deal the sequence for the current level.
    pub fn deal<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let len = self.level as usize + 2;
        self.sequence = (0..len)
            .map(|_| rng.gen_range(0..MEMORY_PAD_COUNT))
            .collect();
        self.progress = 0;
        self.game_over = false;
    }

    /// The sequence to display during the show phase.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// Press a pad. On level completion the level counter advances; call
    /// [`deal`](Self::deal) to produce the next sequence.
    pub fn press(&mut self, pad: u8) -> MemoryOutcome {
        if self.game_over || self.sequence.is_empty() {
            return MemoryOutcome::GameOver;
        }
        if self.sequence.get(self.progress) != Some(&pad) {
            self.game_over = true;
            return MemoryOutcome::GameOver;
        }
        self.progress += 1;
        if self.progress == self.sequence.len() {
            let points = self.level * MEMORY_POINTS_PER_LEVEL;
            self.level += 1;
            self.sequence.clear();
            self.progress = 0;
            MemoryOutcome::LevelComplete { points }
        } else {
            MemoryOutcome::Advanced
        }
    }
}

impl Default for MemoryGame {
    fn default() -> Self {
        Self::new()
    }
}

// ── Round bookkeeping ───────────────────────────────────────────────

/// Score and clock shared by all three mini-games. The clock freezes at
/// zero; the round simply stops accepting answers.
#[derive(Debug, Clone)]
pub struct MinigameRound {
    score: u32,
    countdown: Countdown,
}

impl MinigameRound {
    pub fn new() -> Self {
        Self {
            score: 0,
            countdown: Countdown::new(ROUND_SECONDS, TimeoutPolicy::FreezeAtZero),
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn is_over(&self) -> bool {
        self.countdown.remaining() == 0
    }

    /// Add points; ignored once the round is over.
    pub fn award(&mut self, points: u32) {
        if !self.is_over() {
            self.score += points;
        }
    }

    /// Advance the clock by one wall-clock second.
    pub fn tick(&mut self) -> TickOutcome {
        self.countdown.tick()
    }
}

impl Default for MinigameRound {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn word_puzzle_scrambles_and_checks() {
        let mut rng = rng();
        for _ in 0..20 {
            let puzzle = WordPuzzle::generate(&mut rng);
            assert_ne!(puzzle.scrambled(), puzzle.solution());
            // Same multiset of letters.
            let mut a: Vec<char> = puzzle.scrambled().chars().collect();
            let mut b: Vec<char> = puzzle.solution().chars().collect();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
            assert!(puzzle.check(puzzle.solution()));
            assert!(!puzzle.check("not the word"));
        }
    }

    #[test]
    fn math_quiz_answer_is_consistent_with_question() {
        let mut rng = rng();
        for _ in 0..50 {
            let quiz = MathQuiz::generate(&mut rng);
            let parts: Vec<&str> = quiz.question().split_whitespace().collect();
            let a: i64 = parts[0].parse().unwrap();
            let b: i64 = parts[2].parse().unwrap();
            let expected = match parts[1] {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                other => panic!("unexpected operator {other}"),
            };
            assert!(quiz.check(expected));
            assert!(!quiz.check(expected + 1));
            // Subtraction never goes negative.
            assert!(expected >= 0);
        }
    }

    #[test]
    fn memory_game_sequence_length_tracks_level() {
        let mut rng = rng();
        let mut game = MemoryGame::new();
        game.deal(&mut rng);
        assert_eq!(game.sequence().len(), 3); // level 1 + 2
        assert!(game.sequence().iter().all(|&p| p < MEMORY_PAD_COUNT));
    }

    #[test]
    fn memory_game_level_complete_awards_scaled_points() {
        let mut rng = rng();
        let mut game = MemoryGame::new();
        game.deal(&mut rng);
        let sequence = game.sequence().to_vec();

        for &pad in &sequence[..sequence.len() - 1] {
            assert_eq!(game.press(pad), MemoryOutcome::Advanced);
        }
        let last = sequence[sequence.len() - 1];
        assert_eq!(
            game.press(last),
            MemoryOutcome::LevelComplete {
                points: MEMORY_POINTS_PER_LEVEL
            }
        );
        assert_eq!(game.level(), 2);

        // Level 2 sequence is one longer and completion pays 2x.
        game.deal(&mut rng);
        assert_eq!(game.sequence().len(), 4);
    }

    #[test]
    fn memory_game_wrong_pad_ends_run() {
        let mut rng = rng();
        let mut game = MemoryGame::new();
        game.deal(&mut rng);
        let first = game.sequence()[0];
        let wrong = (first + 1) % MEMORY_PAD_COUNT;

        assert_eq!(game.press(wrong), MemoryOutcome::GameOver);
        assert!(game.is_over());
        assert_eq!(game.press(first), MemoryOutcome::GameOver);
    }

    #[test]
    fn round_clock_freezes_and_stops_scoring() {
        let mut round = MinigameRound::new();
        round.award(WORD_POINTS);
        assert_eq!(round.score(), 10);

        for _ in 0..ROUND_SECONDS {
            round.tick();
        }
        assert!(round.is_over());
        round.award(MATH_POINTS);
        assert_eq!(round.score(), 10, "points after expiry must not count");
    }
}
