//! WebSocket Game Server
//!
//! Async WebSocket server for the shared arena.
//! Connection tasks only parse and forward; all game state lives in a single
//! game-loop task that owns the [`ArenaSession`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, GameConfig, ServerConfig};
use crate::core::rng::SeededRng;
use crate::game::physics::{ArenaPhysics, PhysicsWorld};
use crate::game::state::{GameWorld, SessionId};
use crate::network::health::run_health_server;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::session::{ArenaSession, GameCommand, SessionError};

/// Pending commands the game loop can fall behind by.
const COMMAND_QUEUE: usize = 1024;

/// Outgoing messages buffered per connection.
const OUTBOUND_QUEUE: usize = 64;

/// How long a closing connection gets to flush its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Holds one slot of the connection limit until dropped.
struct ConnectionSlot {
    count: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(count: &Arc<AtomicUsize>, max: usize) -> Result<Self, GameServerError> {
        let previous = count.fetch_add(1, Ordering::SeqCst);
        let slot = Self { count: count.clone() };
        if previous >= max {
            return Err(GameServerError::ConnectionLimitReached);
        }
        Ok(slot)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Open connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let game = self.config.game.clone();
        let world = GameWorld::new(ArenaPhysics::new(game.arena.gravity), game.clone())?;
        let session = ArenaSession::new(world, SeededRng::from_entropy());

        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(
            "Game server v{} listening on {} ({} Hz sim, {} Hz broadcast)",
            self.config.version,
            self.config.bind_addr(),
            game.sim_rate_hz,
            game.broadcast_rate_hz
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        let game_handle = tokio::spawn(run_game_loop(
            session,
            command_rx,
            game,
            self.shutdown_tx.subscribe(),
        ));

        let health_addr = self.config.health_addr();
        let health_commands = command_tx.clone();
        let health_shutdown = self.shutdown_tx.subscribe();
        let health_handle = tokio::spawn(async move {
            if let Err(e) = run_health_server(health_addr, health_commands, health_shutdown).await {
                error!("Health endpoint stopped: {}", e);
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            match ConnectionSlot::acquire(&self.connections, self.config.max_connections) {
                                Ok(slot) => {
                                    debug!("New connection from {}", addr);
                                    self.handle_connection(stream, addr, slot, command_tx.clone());
                                }
                                Err(e) => warn!("Rejecting {}: {}", addr, e),
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(command_tx);
        if game_handle.await.is_err() {
            error!("Game loop task panicked");
        }
        health_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        slot: ConnectionSlot,
        commands: mpsc::Sender<GameCommand>,
    ) {
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, addr, commands, shutdown_rx).await {
                debug!("Connection {} ended with error: {}", addr, e);
            }
            drop(slot);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Handle that triggers shutdown from another task.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Get open connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Drive one WebSocket: a writer task drains the outgoing queue, this task
/// reads frames and forwards them to the game loop.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: mpsc::Sender<GameCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    let session = SessionId::new_v4();
    commands
        .send(GameCommand::Connect { session, sender: msg_tx.clone() })
        .await
        .map_err(|_| GameServerError::Internal("game loop is not running".to_string()))?;
    debug!("Connection {} is session {}", addr, session);

    // Spawn message sender task
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Handle incoming messages
    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let parsed = match msg {
                    Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                    Some(Ok(Message::Binary(data))) => ClientMessage::from_slice(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    // Ping/pong frames are answered by tungstenite
                    Some(Ok(_)) => continue,
                };

                match parsed {
                    Ok(message) => {
                        if commands.send(GameCommand::Message { session, message }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Invalid message from {}: {}", addr, e);
                        let _ = msg_tx.try_send(ServerMessage::Error(ServerError::new(
                            ErrorCode::InvalidMessage,
                            "Invalid message format",
                        )));
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    // The game loop holds the other sender; disconnecting releases it
    drop(msg_tx);
    let _ = commands.send(GameCommand::Disconnect { session }).await;
    if tokio::time::timeout(FLUSH_TIMEOUT, sender_task).await.is_err() {
        debug!("Connection {} did not flush in time", addr);
    }

    Ok(())
}

/// Own the session and multiplex commands with the three clocks.
///
/// Returns the session once the command channel closes or shutdown fires.
pub async fn run_game_loop<P: PhysicsWorld>(
    mut session: ArenaSession<P>,
    mut commands: mpsc::Receiver<GameCommand>,
    config: GameConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ArenaSession<P> {
    let mut sim_clock = interval(config.tick_duration());
    sim_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut broadcast_clock = interval(config.broadcast_interval());
    broadcast_clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut decay_clock = interval(config.combo_decay_interval);
    decay_clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            now = sim_clock.tick() => {
                session.simulation_tick(now.into_std());
            }
            _ = broadcast_clock.tick() => {
                session.broadcast_tick();
            }
            now = decay_clock.tick() => {
                session.combo_decay_tick(now.into_std());
            }
            command = commands.recv() => {
                match command {
                    Some(command) => session.handle_command(command, std::time::Instant::now()),
                    None => break,
                }
            }
            _ = shutdown_rx.recv() => {
                session.shutdown("Server shutting down");
                break;
            }
        }
    }

    let (sent, skipped) = session.broadcast_stats();
    info!(
        "Game loop stopped at tick {} ({} snapshots sent, {} skipped)",
        session.world().tick,
        sent,
        skipped
    );
    session
}
