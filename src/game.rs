//! Race session controller.
//!
//! [`GameSession`] owns the one mutable [`Session`], the analysis recorder,
//! the race timers and (in multiplayer) the [`SyncChannel`]. Every mutation
//! goes through `&mut self`, so keystrokes, ticks and broadcasts always read
//! the current counters rather than a copy taken when a timer was set up.
//!
//! ```text
//! Idle --start_session--> Loading --content_ready / INIT--> Playing
//! Playing --time up / end_session--> Finished --restart--> Loading | Idle
//! any --reset--> Idle (single player, peer torn down)
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::analysis::{AnalysisData, AnalysisRecorder, RaceSummary};
use crate::config::RaceConfig;
use crate::content::{non_empty, ContentProvider, Difficulty, WithFallback};
use crate::error::{SessionError, SyncError};
use crate::metrics::{score_input, Keystroke, MetricsSnapshot, Outcome};
use crate::runtime::RaceTimers;
use crate::session::{Mode, Session, Status};
use crate::sync::{
    FinishPayload, InitPayload, Message, OpponentSnapshot, PeerId, PeerState, Role,
    Subscription, SyncChannel, SyncEvent, UpdatePayload,
};
use crate::time_series::HistorySample;

/// Notifications for the presentation layer, drained with
/// [`GameSession::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { sentence_count: usize },
    /// Transient wrong-key signal. `expected` is `None` past the sentence end.
    Miss { expected: Option<char>, typed: char },
    SentenceCompleted { index: usize },
    Finished { final_wpm: u32 },
    /// One-time notice that multiplayer setup failed and the session is
    /// single player again.
    ConnectionFailed { reason: String },
    PeerConnected { remote: PeerId },
    PeerDisconnected,
    OpponentFinished { wpm: u32 },
}

/// Multiplayer waiting rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lobby {
    /// Host is waiting for someone to dial in.
    WaitingForPeer,
    /// Host has a peer and may pick a difficulty.
    Ready,
    /// Client is waiting for the host's INIT. There is no timeout.
    WaitingForHost,
}

#[derive(Debug)]
pub struct GameSession {
    config: RaceConfig,
    session: Session,
    recorder: AnalysisRecorder,
    opponent: OpponentSnapshot,
    channel: Option<SyncChannel>,
    subscription: Option<Subscription>,
    timers: RaceTimers,
    analysis: Option<AnalysisData>,
    events: VecDeque<SessionEvent>,
    waiting_since: Option<Instant>,
}

impl GameSession {
    pub fn new(config: RaceConfig) -> Self {
        Self {
            session: Session::new(config.duration),
            recorder: AnalysisRecorder::new(),
            opponent: OpponentSnapshot::default(),
            channel: None,
            subscription: None,
            timers: RaceTimers::new(&config),
            analysis: None,
            events: VecDeque::new(),
            waiting_since: None,
            config,
        }
    }

    /// Opens a host identity on `channel`. Returns the id the opponent
    /// should dial, or `None` if the transport failed and the session fell
    /// back to single player.
    pub fn host(&mut self, mut channel: SyncChannel) -> Result<Option<PeerId>, SessionError> {
        self.require_fresh("host a race")?;

        match channel.initialize(Role::Host) {
            Ok(id) => {
                self.attach(channel);
                self.session.mode = Mode::Host;
                info!("hosting as {}", id);
                Ok(Some(id))
            }
            Err(e) => {
                self.connection_failed(e);
                Ok(None)
            }
        }
    }

    /// Dials the host at `remote`. On success the session waits in
    /// `Loading` for the host's INIT; on failure it stays single player.
    pub fn join(
        &mut self,
        mut channel: SyncChannel,
        remote: &PeerId,
        now: Instant,
    ) -> Result<bool, SessionError> {
        self.require_fresh("join a race")?;

        let joined = channel
            .initialize(Role::Client)
            .and_then(|_| channel.join(remote));

        match joined {
            Ok(()) => {
                self.attach(channel);
                self.session.mode = Mode::Client;
                self.session.status = Status::Loading;
                self.waiting_since = Some(now);
                info!("joined {}, waiting for race content", remote);
                Ok(true)
            }
            Err(e) => {
                channel.cleanup();
                self.connection_failed(e);
                Ok(false)
            }
        }
    }

    /// Picks the difficulty and moves to `Loading`. Content then arrives
    /// through [`content_ready`](Self::content_ready) or [`load`](Self::load).
    pub fn start_session(&mut self, difficulty: Difficulty) -> Result<(), SessionError> {
        match self.session.mode {
            Mode::Client => return Err(SessionError::NotContentAuthority),
            Mode::Host if !self.is_peer_connected() => return Err(SessionError::PeerNotConnected),
            _ => {}
        }
        if !matches!(self.session.status, Status::Idle | Status::Loading) {
            return Err(self.invalid("start a race"));
        }

        self.session.difficulty = difficulty;
        self.session.status = Status::Loading;
        self.analysis = None;
        info!("loading {} race", difficulty);
        Ok(())
    }

    /// Starts the race with `sentences`. A host sends them to its peer
    /// first.
    pub fn content_ready(
        &mut self,
        sentences: Vec<String>,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.session.mode == Mode::Client {
            return Err(SessionError::NotContentAuthority);
        }
        if self.session.status != Status::Loading {
            return Err(self.invalid("start playing"));
        }
        let sentences = non_empty(sentences);
        if sentences.is_empty() {
            return Err(SessionError::NoContent);
        }

        if self.session.mode == Mode::Host {
            if let Some(host_id) = self.local_id() {
                self.send(Message::Init(InitPayload {
                    sentences: sentences.clone(),
                    difficulty: self.session.difficulty,
                    host_id,
                }));
            }
        }
        self.begin_race(sentences, now);
        Ok(())
    }

    /// Fetches sentences for the chosen difficulty (falling back to the
    /// built-in corpus) and starts the race.
    pub fn load<P: ContentProvider>(
        &mut self,
        provider: &mut WithFallback<P>,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.session.status != Status::Loading {
            return Err(self.invalid("load content"));
        }
        let sentences = provider.fetch(self.session.difficulty);
        self.content_ready(sentences, now)
    }

    /// Applies the new contents of the input field.
    ///
    /// Returns the scored keystroke, or `None` when nothing was scored
    /// (deletions, or not playing).
    pub fn handle_keystroke(&mut self, input: &str) -> Option<Keystroke> {
        if self.session.status != Status::Playing {
            return None;
        }

        let (keystroke, completed) = {
            let target = self.session.current_target()?;
            (
                score_input(&self.session.input_buffer, input, target),
                input == target,
            )
        };

        if let Some(k) = keystroke {
            self.session.counters.record(k.outcome);
            if k.outcome == Outcome::Incorrect {
                if let Some(key) = k.miss_key() {
                    self.recorder.record_miss(key);
                }
                self.events.push_back(SessionEvent::Miss {
                    expected: k.expected,
                    typed: k.typed,
                });
            }
        }

        self.session.input_buffer.clear();
        self.session.input_buffer.push_str(input);

        if completed {
            let index = self.session.sentence_index;
            self.session.advance_sentence();
            debug!("completed sentence {}", index);
            self.events.push_back(SessionEvent::SentenceCompleted { index });
        }
        keystroke
    }

    /// Countdown step: updates the remaining time, samples history and
    /// ends the race when time runs out.
    pub fn tick(&mut self, now: Instant) {
        if self.session.status != Status::Playing {
            return;
        }

        let elapsed = self.session.elapsed(now);
        self.session.time_remaining = self.config.duration.saturating_sub(elapsed);

        let wpm = self.session.counters.wpm(elapsed);
        let opponent_wpm = self
            .session
            .mode
            .is_multiplayer()
            .then_some(self.opponent.wpm);
        self.recorder.sample(elapsed, wpm, opponent_wpm);

        if self.session.time_remaining.is_zero() {
            self.end_session(now);
        }
    }

    /// Sends the current WPM and progress to the peer.
    pub fn broadcast(&mut self, now: Instant) {
        if self.session.status != Status::Playing || !self.session.mode.is_multiplayer() {
            return;
        }
        let snapshot = self.snapshot(now);
        let id = self.local_id();
        self.send(Message::Update(UpdatePayload {
            wpm: Some(snapshot.wpm),
            progress: Some(snapshot.progress),
            id,
        }));
    }

    /// Drives the session to `now`: handles peer traffic first, then fires
    /// whichever of the tick and broadcast intervals are due.
    pub fn advance(&mut self, now: Instant) {
        self.poll_peer(now);
        if self.timers.tick.poll(now) {
            self.tick(now);
        }
        if self.timers.broadcast.poll(now) {
            self.broadcast(now);
        }
    }

    /// Ends the race. Does nothing unless playing.
    pub fn end_session(&mut self, now: Instant) {
        if self.session.status != Status::Playing {
            return;
        }

        self.timers.cancel();
        self.session.ended_at = Some(now);
        self.session.status = Status::Finished;

        let elapsed = self.session.elapsed(now);
        self.session.time_remaining = self.config.duration.saturating_sub(elapsed);
        let final_wpm = self.session.counters.wpm(elapsed);

        self.analysis = Some(self.recorder.finalize(RaceSummary {
            final_wpm,
            accuracy: self.session.counters.accuracy(),
            total_time: elapsed,
            difficulty: self.session.difficulty,
            opponent_final_wpm: self.opponent.finished_wpm,
        }));

        if self.session.mode.is_multiplayer() {
            self.send(Message::Finish(FinishPayload { wpm: final_wpm }));
        }
        info!(
            "race finished: {} wpm, {}% accuracy",
            final_wpm,
            self.session.counters.accuracy()
        );
        self.events.push_back(SessionEvent::Finished { final_wpm });
    }

    /// Leaves the results screen for another race. Single player reloads
    /// at the same difficulty; a host returns to its lobby and a client
    /// waits for the host's next INIT. The peer link is kept.
    pub fn restart(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.session.status != Status::Finished {
            return Err(self.invalid("restart"));
        }

        self.clear_race();
        self.session.status = match self.session.mode {
            Mode::Single => Status::Loading,
            Mode::Host => Status::Idle,
            Mode::Client => {
                self.waiting_since = Some(now);
                Status::Loading
            }
        };
        Ok(())
    }

    /// Back to the menu: stops timers, tears down any peer link and clears
    /// every per-race value.
    pub fn reset(&mut self) {
        self.timers.cancel();
        self.detach();
        self.session = Session::new(self.config.duration);
        self.recorder.reset();
        self.opponent = OpponentSnapshot::default();
        self.analysis = None;
        self.waiting_since = None;
    }

    pub fn snapshot(&self, now: Instant) -> MetricsSnapshot {
        let elapsed = self.session.elapsed(now);
        MetricsSnapshot {
            wpm: self.session.counters.wpm(elapsed),
            accuracy: self.session.counters.accuracy(),
            progress: self.session.progress(),
            time_left: self.config.duration.saturating_sub(elapsed),
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn lobby(&self) -> Option<Lobby> {
        match (self.session.mode, self.session.status) {
            (Mode::Host, Status::Idle) if self.is_peer_connected() => Some(Lobby::Ready),
            (Mode::Host, Status::Idle) => Some(Lobby::WaitingForPeer),
            (Mode::Client, Status::Loading) => Some(Lobby::WaitingForHost),
            _ => None,
        }
    }

    /// How long a client has been waiting for the host's INIT.
    pub fn waiting_for(&self, now: Instant) -> Option<Duration> {
        if self.lobby() != Some(Lobby::WaitingForHost) {
            return None;
        }
        self.waiting_since
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> Status {
        self.session.status
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn opponent(&self) -> &OpponentSnapshot {
        &self.opponent
    }

    pub fn analysis(&self) -> Option<&AnalysisData> {
        self.analysis.as_ref()
    }

    pub fn history(&self) -> &[HistorySample] {
        self.recorder.history()
    }

    pub fn peak_wpm(&self) -> u32 {
        self.recorder.peak_wpm()
    }

    pub fn peer(&self) -> Option<&PeerState> {
        self.channel.as_ref().and_then(SyncChannel::peer)
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.peer().map(|p| p.local_id.clone())
    }

    pub fn is_peer_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(SyncChannel::is_connected)
    }

    pub fn timers_running(&self) -> bool {
        self.timers.is_running()
    }

    fn begin_race(&mut self, sentences: Vec<String>, now: Instant) {
        let count = sentences.len();
        self.session.begin(sentences, now, self.config.duration);
        self.recorder.reset();
        self.opponent.reset();
        self.analysis = None;
        self.waiting_since = None;
        self.timers.start(now, self.session.mode.is_multiplayer());

        info!(
            "race started: {} sentences, {} {}",
            count, self.session.difficulty, self.session.mode
        );
        self.events.push_back(SessionEvent::Started {
            sentence_count: count,
        });
    }

    fn clear_race(&mut self) {
        self.timers.cancel();
        self.session.clear(self.config.duration);
        self.recorder.reset();
        self.opponent.reset();
        self.analysis = None;
    }

    fn poll_peer(&mut self, now: Instant) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        channel.pump();

        let events = match &self.subscription {
            Some(subscription) => subscription.drain(),
            None => return,
        };
        for event in events {
            self.handle_sync_event(event, now);
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent, now: Instant) {
        match event {
            SyncEvent::Connected { remote } => {
                self.events.push_back(SessionEvent::PeerConnected { remote });
            }
            SyncEvent::Disconnected => {
                warn!("peer disconnected; opponent updates stop");
                self.events.push_back(SessionEvent::PeerDisconnected);
            }
            SyncEvent::Message(Message::Init(init)) => self.receive_init(init, now),
            SyncEvent::Message(Message::Update(update)) => self.opponent.merge(&update),
            SyncEvent::Message(Message::Finish(finish)) => {
                self.opponent.finished_wpm = Some(finish.wpm);
                self.events
                    .push_back(SessionEvent::OpponentFinished { wpm: finish.wpm });
            }
        }
    }

    fn receive_init(&mut self, init: InitPayload, now: Instant) {
        if self.session.mode != Mode::Client {
            warn!(
                "ignoring INIT from {} while in {} mode",
                init.host_id, self.session.mode
            );
            return;
        }
        let sentences = non_empty(init.sentences);
        if sentences.is_empty() {
            warn!("dropping INIT from {} without sentences", init.host_id);
            return;
        }
        match self.session.status {
            Status::Loading => {}
            Status::Playing => info!("host {} restarted the race", init.host_id),
            Status::Idle | Status::Finished => {
                info!(
                    "ignoring INIT from {} while {}",
                    init.host_id, self.session.status
                );
                return;
            }
        }

        self.session.difficulty = init.difficulty;
        self.opponent.identity = Some(init.host_id);
        self.begin_race(sentences, now);
    }

    fn send(&mut self, message: Message) {
        if let Some(channel) = self.channel.as_mut() {
            channel.send(&message);
        }
    }

    fn attach(&mut self, mut channel: SyncChannel) {
        self.subscription = Some(channel.subscribe());
        self.channel = Some(channel);
    }

    fn detach(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Some(subscription) = self.subscription.take() {
                channel.unsubscribe(subscription.id());
            }
            channel.cleanup();
        }
        self.subscription = None;
    }

    fn connection_failed(&mut self, error: SyncError) {
        warn!("multiplayer unavailable, playing solo: {}", error);
        self.session.mode = Mode::Single;
        self.events.push_back(SessionEvent::ConnectionFailed {
            reason: error.to_string(),
        });
    }

    fn require_fresh(&self, action: &'static str) -> Result<(), SessionError> {
        if self.session.status != Status::Idle || self.channel.is_some() {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            status: self.session.status,
        }
    }
}
