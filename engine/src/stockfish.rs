use crate::uci::{parse_uci_message, UciMessage};
use crate::{
    EngineCommand, EngineError, EngineEvaluation, EngineEvent, EngineInfo, Evaluator,
    EvaluatorFactory, GoParams,
};
use chess::{format_fen, format_uci_move, parse_fen};
use cozy_chess::{Board, GameStatus, Move};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};

const INIT_TIMEOUT: Duration = Duration::from_secs(10);
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait for `bestmove` after sending `stop`.
const STOP_GRACE: Duration = Duration::from_millis(500);

pub struct StockfishEngine {
    process: Child,
    command_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

/// Configuration for engine performance tuning.
#[derive(Debug, Clone, Default)]
pub struct StockfishConfig {
    /// Explicit binary; searched for in common locations when unset.
    pub path: Option<PathBuf>,
    pub skill_level: Option<u8>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish instance and complete the UCI handshake.
    #[tracing::instrument(level = "info")]
    pub async fn spawn_with_config(config: StockfishConfig) -> Result<Self, EngineError> {
        let path = config
            .path
            .clone()
            .or_else(find_stockfish_path)
            .ok_or_else(|| EngineError::Unavailable("Stockfish not found".to_string()))?;
        tracing::info!("Found Stockfish at: {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn Stockfish: {}", e);
                EngineError::Unavailable(format!("Failed to spawn Stockfish: {}", e))
            })?;

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("Failed to get stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("Failed to get stdout".to_string()))?;

        write_line(&mut stdin, "uci").await?;

        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(32);
        let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(32);

        // Output reader task
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Stockfish stdout EOF - engine closed");
                        let _ = event_tx
                            .send(EngineEvent::Error("engine process exited".to_string()))
                            .await;
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!("UCI << {}", trimmed);

                        let event = match parse_uci_message(trimmed) {
                            Ok(UciMessage::UciOk) | Ok(UciMessage::ReadyOk) => EngineEvent::Ready,
                            Ok(UciMessage::BestMove { mv, .. }) => EngineEvent::BestMove(mv),
                            Ok(UciMessage::Info(info)) => EngineEvent::Info(info),
                            Ok(msg) => {
                                tracing::trace!("Ignoring UCI message: {:?}", msg);
                                continue;
                            }
                            Err(_) => {
                                tracing::trace!("Failed to parse UCI message: {}", trimmed);
                                continue;
                            }
                        };

                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from Stockfish stdout: {}", e);
                        let _ = event_tx.send(EngineEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });

        let handshake = timeout(INIT_TIMEOUT, async {
            while let Some(event) = event_rx.recv().await {
                match event {
                    EngineEvent::Ready => return Ok(()),
                    EngineEvent::Error(msg) => return Err(msg),
                    _ => {}
                }
            }
            Err("Engine closed before sending uciok".to_string())
        })
        .await;

        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("Engine initialization failed: {}", e);
                return Err(EngineError::Unavailable(format!(
                    "Engine initialization failed: {}",
                    e
                )));
            }
            Err(_) => {
                tracing::error!("Timeout waiting for uciok");
                return Err(EngineError::Unavailable(
                    "Timeout waiting for engine to respond".to_string(),
                ));
            }
        }

        // Stdin writer task
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            while let Some(cmd) = stdin_rx.recv().await {
                tracing::trace!("UCI >> {}", cmd.trim());
                if let Err(e) = stdin.write_all(cmd.as_bytes()).await {
                    tracing::error!("Failed to write to stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::error!("Failed to flush stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Stdin writer task exiting");
        });

        // Command processor task
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                tracing::trace!("Processing engine command: {:?}", cmd);
                let cmd_str = match cmd {
                    EngineCommand::SetPosition { ref fen, ref moves } => {
                        let mut position_cmd = format!("position fen {}", fen);
                        if !moves.is_empty() {
                            position_cmd.push_str(" moves");
                            for mv in moves {
                                position_cmd.push_str(&format!(" {}", format_uci_move(*mv)));
                            }
                        }
                        position_cmd.push('\n');
                        position_cmd
                    }
                    EngineCommand::SetOption { name, value } => match value {
                        Some(val) => format!("setoption name {} value {}\n", name, val),
                        None => format!("setoption name {}\n", name),
                    },
                    EngineCommand::NewGame => "ucinewgame\n".to_string(),
                    EngineCommand::IsReady => "isready\n".to_string(),
                    EngineCommand::Go(params) => {
                        let mut go_cmd = "go".to_string();
                        if let Some(depth) = params.depth {
                            go_cmd.push_str(&format!(" depth {}", depth));
                        }
                        go_cmd.push('\n');
                        go_cmd
                    }
                    EngineCommand::Stop => "stop\n".to_string(),
                };

                if let Err(e) = stdin_tx.send(cmd_str).await {
                    tracing::error!("Failed to send command to stdin channel: {}", e);
                }
            }
            tracing::debug!("Command processor task exiting");
        });

        let mut engine = Self {
            process,
            command_tx,
            event_rx,
        };
        engine.apply_config(&config).await?;
        tracing::info!("Stockfish engine spawned and initialized successfully");
        Ok(engine)
    }

    async fn apply_config(&mut self, config: &StockfishConfig) -> Result<(), EngineError> {
        let mut options = Vec::new();
        if let Some(level) = config.skill_level {
            options.push(("Skill Level", level.min(20).to_string()));
        }
        if let Some(threads) = config.threads {
            options.push(("Threads", threads.clamp(1, 16).to_string()));
        }
        if let Some(hash_mb) = config.hash_mb {
            options.push(("Hash", hash_mb.clamp(1, 2048).to_string()));
        }
        for (name, value) in options {
            tracing::info!("Setting {} to {}", name, value);
            self.send_command(EngineCommand::SetOption {
                name: name.to_string(),
                value: Some(value),
            })
            .await?;
        }
        self.send_command(EngineCommand::NewGame).await?;
        self.sync().await
    }

    /// Send a command to the engine
    pub async fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.command_tx.send(cmd).await.map_err(|e| {
            tracing::error!("Failed to send command to queue: {}", e);
            EngineError::Unavailable(format!("Failed to send command: {}", e))
        })
    }

    /// Round-trip `isready`, discarding anything left over from an earlier
    /// search that was cut short.
    async fn sync(&mut self) -> Result<(), EngineError> {
        self.send_command(EngineCommand::IsReady).await?;
        let waited = timeout(SYNC_TIMEOUT, async {
            loop {
                match self.event_rx.recv().await {
                    Some(EngineEvent::Ready) => return Ok(()),
                    Some(EngineEvent::Error(msg)) => return Err(EngineError::Unavailable(msg)),
                    Some(_) => continue,
                    None => {
                        return Err(EngineError::Unavailable(
                            "engine event channel closed".to_string(),
                        ))
                    }
                }
            }
        })
        .await;
        waited.unwrap_or_else(|_| {
            Err(EngineError::Unavailable(
                "engine did not answer isready".to_string(),
            ))
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn search(
        &mut self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> Result<EngineEvaluation, EngineError> {
        let board = parse_fen(fen).map_err(|e| EngineError::InvalidPosition(e.to_string()))?;
        if board.status() != GameStatus::Ongoing {
            return Err(EngineError::InvalidPosition(format!("no legal moves: {}", fen)));
        }

        self.sync().await?;
        self.send_command(EngineCommand::SetPosition {
            fen: format_fen(&board),
            moves: Vec::new(),
        })
        .await?;
        self.send_command(EngineCommand::Go(GoParams { depth: Some(depth) }))
        .await?;

        let deadline = Instant::now() + time_budget;
        let mut latest: Option<EngineInfo> = None;
        let mut stopped = false;

        loop {
            let event = if stopped {
                timeout(STOP_GRACE, self.event_rx.recv()).await
            } else {
                timeout_at(deadline, self.event_rx.recv()).await
            };

            match event {
                Ok(Some(EngineEvent::Info(info))) => {
                    if info.score.is_some() && !info.bound && info.multipv.unwrap_or(1) == 1 {
                        latest = Some(info);
                    }
                }
                Ok(Some(EngineEvent::BestMove(mv))) => {
                    return finish(&board, latest, mv, depth, stopped, time_budget);
                }
                Ok(Some(EngineEvent::Ready)) => {}
                Ok(Some(EngineEvent::Error(msg))) => return Err(EngineError::Unavailable(msg)),
                Ok(None) => {
                    return Err(EngineError::Unavailable(
                        "engine event channel closed".to_string(),
                    ))
                }
                Err(_) if !stopped => {
                    tracing::warn!(fen, depth, ?time_budget, "time budget exceeded, stopping search");
                    stopped = true;
                    self.send_command(EngineCommand::Stop).await?;
                }
                Err(_) => return finish(&board, latest, None, depth, true, time_budget),
            }
        }
    }
}

fn finish(
    board: &Board,
    latest: Option<EngineInfo>,
    best: Option<Move>,
    requested_depth: u8,
    partial: bool,
    time_budget: Duration,
) -> Result<EngineEvaluation, EngineError> {
    let Some(info) = latest else {
        return Err(if partial {
            EngineError::Timeout(time_budget)
        } else {
            EngineError::Protocol("bestmove without a score".to_string())
        });
    };
    let Some(score) = info.score else {
        return Err(EngineError::Protocol("info line without a score".to_string()));
    };
    Ok(EngineEvaluation::from_side_to_move(
        board,
        score,
        best,
        &info.pv,
        info.depth.unwrap_or(requested_depth),
        partial,
    ))
}

impl Evaluator for StockfishEngine {
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> impl Future<Output = Result<EngineEvaluation, EngineError>> + Send {
        self.search(fen, depth, time_budget)
    }
}

/// Spawns [`StockfishEngine`]s for the pool.
#[derive(Debug, Clone, Default)]
pub struct StockfishFactory {
    pub config: StockfishConfig,
}

impl StockfishFactory {
    pub fn new(config: StockfishConfig) -> Self {
        Self { config }
    }
}

impl EvaluatorFactory for StockfishFactory {
    type Evaluator = StockfishEngine;

    fn spawn(&self) -> impl Future<Output = Result<StockfishEngine, EngineError>> + Send {
        StockfishEngine::spawn_with_config(self.config.clone())
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), EngineError> {
    let io_err = |e: std::io::Error| EngineError::Unavailable(format!("Failed to write to stdin: {}", e));
    stdin.write_all(line.as_bytes()).await.map_err(io_err)?;
    stdin.write_all(b"\n").await.map_err(io_err)?;
    stdin.flush().await.map_err(io_err)
}

/// Find Stockfish executable in common locations
pub fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
        "stockfish", // In PATH
    ];

    for path_str in paths {
        let path = Path::new(path_str);
        if (path.exists() || path_str == "stockfish")
            && std::process::Command::new(path_str)
                .arg("--help")
                .output()
                .is_ok()
        {
            return Some(PathBuf::from(path_str));
        }
    }

    None
}
