use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed PGN game: the tag pairs plus main-line SAN tokens.
///
/// Tokens are not validated here; replaying them against a board is the job
/// of [`crate::game::replay`].
#[derive(Debug, Clone, PartialEq)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub moves: Vec<String>,
    pub result: GameResult,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Starting position from the `FEN` tag, when the game did not begin
    /// from the standard position.
    pub fn start_fen(&self) -> Option<&str> {
        self.tag("FEN")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    #[serde(rename = "1-0")]
    WhiteWins,
    #[serde(rename = "0-1")]
    BlackWins,
    #[serde(rename = "1/2-1/2")]
    Draw,
    #[serde(rename = "*")]
    Ongoing,
}

impl GameResult {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "1-0" => Some(Self::WhiteWins),
            "0-1" => Some(Self::BlackWins),
            "1/2-1/2" | "½-½" => Some(Self::Draw),
            "*" => Some(Self::Ongoing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
            Self::Ongoing => "*",
        }
    }
}

/// Parse a PGN string into a game.
///
/// Comments, variations, NAGs and move numbers are skipped. Only a broken tag
/// section is an error; bad movetext is left for replay to truncate.
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    let mut tags = HashMap::new();
    let mut movetext = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && movetext.trim().is_empty() {
            let (name, value) = parse_tag(trimmed)?;
            tags.insert(name, value);
        } else if !trimmed.starts_with('%') {
            movetext.push_str(line);
            movetext.push('\n');
        }
    }

    let (moves, result_token) = tokenize_movetext(&movetext);
    let result = result_token
        .or_else(|| tags.get("Result").and_then(|r| GameResult::parse(r)))
        .unwrap_or(GameResult::Ongoing);

    if moves.is_empty() && tags.is_empty() {
        return Err(PgnError::Empty);
    }

    Ok(PgnGame { tags, moves, result })
}

fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let (name, rest) = inner
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    Ok((name.to_string(), value.replace("\\\"", "\"")))
}

/// Split movetext into main-line SAN tokens and an optional result marker.
fn tokenize_movetext(text: &str) -> (Vec<String>, Option<GameResult>) {
    let mut moves = Vec::new();
    let mut result = None;
    let mut variation_depth = 0usize;
    let mut chars = text.chars();
    let mut word = String::new();

    let flush = |word: &mut String, moves: &mut Vec<String>, result: &mut Option<GameResult>| {
        if word.is_empty() {
            return;
        }
        let token = std::mem::take(word);
        if let Some(r) = GameResult::parse(&token) {
            *result = Some(r);
            return;
        }
        if token.starts_with('$') {
            return;
        }
        // "12." "12..." "12...e5" "12.e4"
        let stripped = match token.find('.') {
            Some(i) if i > 0 && token[..i].bytes().all(|b| b.is_ascii_digit()) => {
                token[i..].trim_start_matches('.')
            }
            _ => token.as_str(),
        };
        if !stripped.is_empty() && !stripped.bytes().all(|b| b.is_ascii_digit()) {
            moves.push(stripped.to_string());
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut word, &mut moves, &mut result);
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            ';' => {
                flush(&mut word, &mut moves, &mut result);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                flush(&mut word, &mut moves, &mut result);
                variation_depth += 1;
            }
            ')' => {
                word.clear();
                variation_depth = variation_depth.saturating_sub(1);
            }
            c if c.is_whitespace() => {
                if variation_depth == 0 {
                    flush(&mut word, &mut moves, &mut result);
                } else {
                    word.clear();
                }
            }
            c => {
                if variation_depth == 0 {
                    word.push(c);
                }
            }
        }
    }
    flush(&mut word, &mut moves, &mut result);

    (moves, result)
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Empty PGN")]
    Empty,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}
