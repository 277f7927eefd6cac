//! Line-oriented text protocol around the search driver.
//!
//! Commands are read one per line, optionally prefixed by a numeric id.
//! Each answer is `=[id] <message>` on success or `?[id] <message>` on
//! failure, followed by a blank line.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `protocol_version`
//! - `list_commands`, `known_command <cmd>`
//! - `quit`
//! - `clear_board` - back to the opening
//! - `setboard <64 squares> [X|O]` - `X` black, `O` white, `-` empty
//! - `play <coord|pass>` - play for the side to move
//! - `search <nodes> <millis> [lower upper]` - answers
//!   `<score> <lower> <upper> <status> <nodes>`
//! - `status` - state of the last search
//! - `analyze` - one line per root move of the last search, best first:
//!   `<move> <eval> <lower> <upper> <nodes> <proof> <disproof> [best]`
//! - `proof_cost` - remaining cost to prove / disprove the root goal
//! - `showboard`
//!
//! ## Example
//!
//! ```ignore
//! use othello_pns::driver::SearchConfig;
//! use othello_pns::protocol::ProtocolEngine;
//! let mut engine = ProtocolEngine::new(SearchConfig::default())?;
//! engine.run()?;
//! ```

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow, bail};

use crate::board::{Board, Color};
use crate::constants::{ENGINE_NAME, MAX_GOAL, MIN_GOAL};
use crate::driver::{SearchConfig, SearchDriver};
use crate::position::{parse_coord, str_coord};
use crate::proofs::Claim;

const KNOWN_COMMANDS: &[&str] = &[
    "analyze",
    "clear_board",
    "known_command",
    "list_commands",
    "name",
    "play",
    "proof_cost",
    "protocol_version",
    "quit",
    "search",
    "setboard",
    "showboard",
    "status",
    "version",
];

pub struct ProtocolEngine {
    board: Board,
    driver: SearchDriver,
}

impl ProtocolEngine {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let driver = SearchDriver::new(config).context("cannot start the search driver")?;
        Ok(Self {
            board: Board::default(),
            driver,
        })
    }

    /// Serves commands from stdin until `quit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(stdin.lock(), stdout.lock())
    }

    /// Serves commands from `input`, writing answers to `output`.
    pub fn serve<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line.context("failed to read command")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            let id = id.map(|i| i.to_string()).unwrap_or_default();
            writeln!(output, "{prefix}{id} {message}\n").context("failed to write answer")?;
            output.flush().context("failed to flush answer")?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Splits an optional numeric command id off the front of a line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        match trimmed[..end].parse::<u32>() {
            Ok(id) => (Some(id), trimmed[end..].trim()),
            Err(_) => (None, trimmed),
        }
    }

    /// Executes one command and returns (success, response).
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match self.dispatch(command, args) {
            Ok(message) => (true, message),
            Err(e) => (false, format!("{e:#}")),
        }
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> Result<String> {
        match command {
            "name" => Ok(ENGINE_NAME.to_string()),

            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),

            "protocol_version" => Ok("1".to_string()),

            "list_commands" => Ok(KNOWN_COMMANDS.join("\n")),

            "known_command" => {
                let name = args.first().ok_or_else(|| anyhow!("missing argument"))?;
                let known = KNOWN_COMMANDS.contains(&name.to_lowercase().as_str());
                Ok(known.to_string())
            }

            "quit" => Ok(String::new()),

            "clear_board" => {
                self.board = Board::default();
                Ok(String::new())
            }

            "setboard" => {
                let squares = args.first().ok_or_else(|| anyhow!("missing board"))?;
                let to_move = match args.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                    None | Some("X") | Some("B") | Some("BLACK") => Color::Black,
                    Some("O") | Some("W") | Some("WHITE") => Color::White,
                    Some(other) => bail!("unknown side to move {other}"),
                };
                self.board = Board::parse(squares, to_move)?;
                Ok(String::new())
            }

            "play" => {
                let coord = args.first().ok_or_else(|| anyhow!("missing move"))?;
                let square = parse_coord(coord).ok_or_else(|| anyhow!("invalid coordinate {coord}"))?;
                self.board.play(square)?;
                Ok(String::new())
            }

            "search" => {
                let nodes: u64 = parse_arg(args, 0, "node budget")?;
                let millis: u64 = parse_arg(args, 1, "time budget")?;
                let (lower, upper) = if args.len() >= 4 {
                    (parse_arg(args, 2, "lower bound")?, parse_arg(args, 3, "upper bound")?)
                } else {
                    (MIN_GOAL, MAX_GOAL)
                };
                let result = self
                    .driver
                    .search(self.board.position(), lower, upper, nodes, millis)?;
                Ok(format!(
                    "{} {} {} {} {}",
                    result.score, result.lower, result.upper, result.status, result.visited
                ))
            }

            "status" => {
                let (lower, upper) = self.driver.bounds().unwrap_or((0, 0));
                Ok(format!(
                    "{} {} {} {} {} {}",
                    self.driver.status(),
                    self.driver.root_score().unwrap_or(0),
                    lower,
                    upper,
                    self.driver.visited_nodes(),
                    self.driver.table_occupancy()
                ))
            }

            "analyze" => {
                if self.driver.root().is_none() {
                    bail!("no search has run");
                }
                let lines: Vec<String> = self
                    .driver
                    .move_annotations()
                    .iter()
                    .map(|m| {
                        format!(
                            "{} {} {} {} {} {:.0} {:.0}{}",
                            str_coord(m.square),
                            m.eval,
                            m.lower,
                            m.upper,
                            m.descendants,
                            m.proof,
                            m.disproof,
                            if m.best { " best" } else { "" }
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }

            "proof_cost" => {
                let goal = self
                    .driver
                    .goal()
                    .ok_or_else(|| anyhow!("no search has run"))?;
                let show = |cost: Option<f64>| cost.map_or("none".to_string(), |c| format!("{c:.0}"));
                Ok(format!(
                    "goal {goal} prove {} disprove {}",
                    show(self.driver.remaining_proof_cost(Claim::ProveGreaterEqual)),
                    show(self.driver.remaining_proof_cost(Claim::DisproveStrictlyGreater))
                ))
            }

            "showboard" => Ok(format!("\n{}", self.board)),

            _ => Err(anyhow!("unknown command: {command}")),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args.get(index).ok_or_else(|| anyhow!("missing {what}"))?;
    raw.parse().with_context(|| format!("invalid {what} {raw}"))
}
