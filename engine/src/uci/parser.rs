use crate::EngineInfo;
use chess::{parse_piece_letter, parse_square, AnalysisScore};
use cozy_chess::{Move, Piece};

/// Incoming message from UCI engine
#[derive(Debug, Clone)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    BestMove { mv: Option<Move>, ponder: Option<Move> },
    Info(EngineInfo),
}

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, crate::UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UciMessage::Id { name, value })
        }

        Some(&"bestmove") => {
            if tokens.len() < 2 {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            }
            // Mated or stalemated positions have no move to report.
            let mv = match tokens[1] {
                "(none)" | "0000" => None,
                token => Some(parse_uci_move(token)?),
            };
            let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
                parse_uci_move(tokens[3]).ok()
            } else {
                None
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }

        Some(&"info") => Ok(UciMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(crate::UciError::UnknownMessage(line.to_string())),
    }
}

/// Parse an "info" line from the engine
fn parse_info_line(tokens: &[&str]) -> EngineInfo {
    let mut info = EngineInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(AnalysisScore::Centipawns),
                            "mate" => value_str.parse().ok().map(AnalysisScore::Mate),
                            _ => None,
                        };
                    }
                    if matches!(tokens.get(i + 1), Some(&"lowerbound") | Some(&"upperbound")) {
                        info.bound = true;
                        i += 1;
                    }
                }
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    if let Ok(mv) = parse_uci_move(tokens[i]) {
                        info.pv.push(mv);
                    }
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "currmove" => {
                i += 1;
                info.currmove = tokens.get(i).and_then(|s| parse_uci_move(s).ok());
            }
            "hashfull" => {
                i += 1;
                info.hashfull = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "string" => break,
            _ => {
                // Unknown keyword, skip
            }
        }
        i += 1;
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

/// Parse UCI move format (e2e4, e7e8q) without a board.
///
/// Castling stays in UCI form; resolve it against a position with
/// [`chess::convert_uci_castling_to_cozy`].
pub fn parse_uci_move(s: &str) -> Result<Move, crate::UciError> {
    let invalid = || crate::UciError::InvalidMove(s.to_string());
    if !s.is_ascii() || !(4..=5).contains(&s.len()) {
        return Err(invalid());
    }

    let from = parse_square(&s[0..2]).ok_or_else(invalid)?;
    let to = parse_square(&s[2..4]).ok_or_else(invalid)?;

    let promotion = match s[4..].chars().next() {
        Some(c) => match parse_piece_letter(c) {
            Some(p @ (Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen)) => Some(p),
            _ => return Err(invalid()),
        },
        None => None,
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::format_uci_move;

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_message("bestmove e2e4 ponder e7e5").unwrap();
        match msg {
            UciMessage::BestMove { mv, ponder } => {
                assert_eq!(format_uci_move(mv.unwrap()), "e2e4");
                assert_eq!(format_uci_move(ponder.unwrap()), "e7e5");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_bestmove_none() {
        let msg = parse_uci_message("bestmove (none)").unwrap();
        assert!(matches!(msg, UciMessage::BestMove { mv: None, ponder: None }));
    }

    #[test]
    fn test_parse_info() {
        let msg = parse_uci_message("info depth 12 score cp 35 nodes 15234 pv e2e4 e7e5").unwrap();
        match msg {
            UciMessage::Info(info) => {
                assert_eq!(info.depth, Some(12));
                assert_eq!(info.score, Some(AnalysisScore::Centipawns(35)));
                assert_eq!(info.nodes, Some(15234));
                assert_eq!(info.pv.len(), 2);
                assert!(!info.bound);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_info_mate_and_bound() {
        let msg = parse_uci_message("info depth 20 score mate -3 upperbound pv h7h6").unwrap();
        match msg {
            UciMessage::Info(info) => {
                assert_eq!(info.score, Some(AnalysisScore::Mate(-3)));
                assert!(info.bound);
                assert_eq!(info.pv.len(), 1);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_info_string_is_ignored() {
        let msg = parse_uci_message("info string NNUE evaluation using nn-abc.nnue").unwrap();
        assert!(matches!(msg, UciMessage::Info(info) if info.score.is_none()));
    }
}
