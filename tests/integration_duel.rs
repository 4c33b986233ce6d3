use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use typerace::config::RaceConfig;
use typerace::content::Difficulty;
use typerace::session::{Mode, Status};
use typerace::sync::{PeerId, Switchboard, SyncChannel};
use typerace::{GameSession, Lobby, SessionEvent};

struct Duel {
    board: Switchboard,
    host: GameSession,
    client: GameSession,
    host_id: PeerId,
    client_id: PeerId,
    t0: Instant,
}

fn duel(duration: Duration) -> Duel {
    let board = Switchboard::new();
    let t0 = Instant::now();

    let mut host = GameSession::new(RaceConfig::with_duration(duration));
    let host_id = host
        .host(SyncChannel::new(board.transport()))
        .unwrap()
        .unwrap();
    assert_eq!(host.lobby(), Some(Lobby::WaitingForPeer));

    let mut client = GameSession::new(RaceConfig::with_duration(duration));
    assert!(client
        .join(SyncChannel::new(board.transport()), &host_id, t0)
        .unwrap());

    host.advance(t0);
    client.advance(t0);
    let client_id = client.local_id().unwrap();

    Duel {
        board,
        host,
        client,
        host_id,
        client_id,
        t0,
    }
}

fn start(d: &mut Duel, difficulty: Difficulty, sentences: &[&str]) {
    d.host.start_session(difficulty).unwrap();
    d.host
        .content_ready(sentences.iter().map(|s| s.to_string()).collect(), d.t0)
        .unwrap();
    d.client.advance(d.t0);
}

fn type_out(game: &mut GameSession, text: &str) {
    let mut buffer = game.session().input_buffer.clone();
    for c in text.chars() {
        buffer.push(c);
        game.handle_keystroke(&buffer);
    }
}

#[test]
fn lobby_reports_connection() {
    let mut d = duel(Duration::from_secs(30));
    assert_eq!(d.host.lobby(), Some(Lobby::Ready));
    assert_eq!(d.client.lobby(), Some(Lobby::WaitingForHost));
    assert_eq!(d.host.mode(), Mode::Host);
    assert_eq!(d.client.mode(), Mode::Client);
    assert_eq!(
        d.host.peer().and_then(|p| p.remote_id.clone()),
        Some(d.client_id.clone())
    );
    assert_matches!(
        d.host.drain_events().as_slice(),
        [SessionEvent::PeerConnected { .. }]
    );
}

#[test]
fn init_delivers_host_content() {
    let mut d = duel(Duration::from_secs(30));
    start(&mut d, Difficulty::Medium, &["The fox runs."]);

    assert_eq!(d.host.status(), Status::Playing);
    assert_eq!(d.client.status(), Status::Playing);
    assert_eq!(d.client.session().sentences, vec!["The fox runs."]);
    assert_eq!(d.client.session().difficulty, Difficulty::Medium);
    assert_eq!(d.client.opponent().identity, Some(d.host_id.clone()));
    assert_eq!(d.client.lobby(), None);
    assert!(d
        .client
        .drain_events()
        .contains(&SessionEvent::Started { sentence_count: 1 }));
}

#[test]
fn broadcast_reaches_opponent() {
    let mut d = duel(Duration::from_secs(30));
    start(&mut d, Difficulty::Easy, &["The fox runs."]);

    type_out(&mut d.host, "The");
    let half = d.t0 + Duration::from_millis(500);
    d.host.advance(half);
    d.client.advance(half);

    let opponent = d.client.opponent();
    assert_eq!(opponent.wpm, 72);
    assert!((opponent.progress - 3.0 / 13.0).abs() < 1e-9);

    // the client's own sample carries the opponent's latest WPM
    assert_eq!(d.client.history().len(), 1);
    assert_eq!(d.client.history()[0].opponent_wpm, Some(72));

    d.host.advance(half);
    assert_eq!(d.host.opponent().identity, Some(d.client_id.clone()));
}

#[test]
fn late_update_overwrites_fresher_one() {
    let mut d = duel(Duration::from_secs(30));
    start(&mut d, Difficulty::Easy, &["The fox runs."]);

    assert!(d.board.inject(
        &d.client_id,
        r#"{"type":"UPDATE","payload":{"wpm":40,"progress":0.2}}"#
    ));
    assert!(d.board.inject(
        &d.client_id,
        r#"{"type":"UPDATE","payload":{"wpm":30,"progress":0.1}}"#
    ));
    d.client.advance(d.t0);

    assert_eq!(d.client.opponent().wpm, 30);
    assert_eq!(d.client.opponent().progress, 0.1);
}

#[test]
fn malformed_frames_are_dropped() {
    let mut d = duel(Duration::from_secs(30));
    start(&mut d, Difficulty::Easy, &["The fox runs."]);

    d.board.inject(&d.client_id, "not json");
    d.board.inject(&d.client_id, r#"{"type":"PING","payload":{}}"#);
    d.board.inject(
        &d.client_id,
        r#"{"type":"UPDATE","payload":{"wpm":55}}"#,
    );
    d.client.advance(d.t0);

    assert_eq!(d.client.status(), Status::Playing);
    assert_eq!(d.client.opponent().wpm, 55);
}

#[test]
fn client_ignores_init_without_sentences() {
    let mut d = duel(Duration::from_secs(30));
    d.board.inject(
        &d.client_id,
        r#"{"type":"INIT","payload":{"sentences":["  "],"difficulty":"EASY","hostId":"ABC123"}}"#,
    );
    d.client.advance(d.t0);

    assert_eq!(d.client.status(), Status::Loading);
    assert_eq!(d.client.lobby(), Some(Lobby::WaitingForHost));
}

#[test]
fn host_ignores_incoming_init() {
    let mut d = duel(Duration::from_secs(30));
    d.board.inject(
        &d.host_id,
        r#"{"type":"INIT","payload":{"sentences":["hijack"],"difficulty":"HARD","hostId":"ABC123"}}"#,
    );
    d.host.advance(d.t0);

    assert_eq!(d.host.status(), Status::Idle);
    assert_eq!(d.host.lobby(), Some(Lobby::Ready));
}

#[test]
fn finish_scores_are_exchanged() {
    let duration = Duration::from_secs(2);
    let mut d = duel(duration);
    start(&mut d, Difficulty::Easy, &["The fox runs."]);

    type_out(&mut d.host, "The fox");
    type_out(&mut d.client, "The");

    let mut now = d.t0;
    while now < d.t0 + duration {
        now += Duration::from_millis(100);
        d.host.advance(now);
        d.client.advance(now);
    }
    assert_eq!(d.host.status(), Status::Finished);
    assert_eq!(d.client.status(), Status::Finished);
    assert!(!d.host.timers_running());
    assert!(!d.client.timers_running());

    d.host.advance(now);

    let host_final = d.host.analysis().unwrap().final_wpm;
    let client_final = d.client.analysis().unwrap().final_wpm;
    assert_eq!(host_final, 42);
    assert_eq!(client_final, 18);

    assert_eq!(d.client.opponent().finished_wpm, Some(host_final));
    assert_eq!(d.host.opponent().finished_wpm, Some(client_final));
    assert_eq!(
        d.client.analysis().unwrap().opponent_final_wpm,
        Some(host_final)
    );
    assert!(d
        .host
        .drain_events()
        .contains(&SessionEvent::OpponentFinished { wpm: client_final }));
}

#[test]
fn restart_returns_host_to_lobby_and_client_to_waiting() {
    let duration = Duration::from_secs(1);
    let mut d = duel(duration);
    start(&mut d, Difficulty::Easy, &["one"]);

    let end = d.t0 + duration;
    d.host.end_session(end);
    d.client.end_session(end);

    let later = end + Duration::from_secs(1);
    d.host.restart(later).unwrap();
    d.client.restart(later).unwrap();
    d.host.advance(later);
    d.client.advance(later);

    assert_eq!(d.host.lobby(), Some(Lobby::Ready));
    assert_eq!(d.client.lobby(), Some(Lobby::WaitingForHost));
    assert_eq!(d.client.waiting_for(later), Some(Duration::ZERO));
    assert!(d.client.analysis().is_none());

    d.host.start_session(Difficulty::Hard).unwrap();
    d.host.content_ready(vec!["two".into()], later).unwrap();
    d.client.advance(later);

    assert_eq!(d.client.status(), Status::Playing);
    assert_eq!(d.client.session().difficulty, Difficulty::Hard);
    assert_eq!(d.client.session().sentences, vec!["two"]);
}

#[test]
fn peer_leaving_is_reported() {
    let mut d = duel(Duration::from_secs(30));
    d.host.drain_events();

    d.client.reset();
    assert_eq!(d.client.mode(), Mode::Single);
    assert!(d.client.peer().is_none());

    d.host.advance(d.t0);
    assert!(!d.host.is_peer_connected());
    assert_eq!(d.host.lobby(), Some(Lobby::WaitingForPeer));
    assert_eq!(d.host.drain_events(), vec![SessionEvent::PeerDisconnected]);
}

#[test]
fn offline_signaling_falls_back_to_solo() {
    let board = Switchboard::new();
    board.set_offline(true);
    let t0 = Instant::now();

    let mut game = GameSession::new(RaceConfig::with_duration(Duration::from_secs(5)));
    assert_eq!(game.host(SyncChannel::new(board.transport())).unwrap(), None);
    assert_eq!(game.mode(), Mode::Single);
    assert_matches!(
        game.drain_events().as_slice(),
        [SessionEvent::ConnectionFailed { reason }] if reason.contains("unreachable")
    );

    game.start_session(Difficulty::Easy).unwrap();
    game.content_ready(vec!["solo".into()], t0).unwrap();
    assert_eq!(game.status(), Status::Playing);
    game.advance(t0 + Duration::from_millis(500));
    assert_eq!(game.history()[0].opponent_wpm, None);
}

#[test]
fn finished_client_keeps_results_when_host_starts_next_race() {
    let duration = Duration::from_secs(1);
    let mut d = duel(duration);
    start(&mut d, Difficulty::Easy, &["one"]);
    type_out(&mut d.client, "on");

    let end = d.t0 + duration;
    d.host.end_session(end);
    d.client.end_session(end);
    let results = d.client.analysis().cloned().unwrap();

    d.host.restart(end).unwrap();
    d.host.start_session(Difficulty::Hard).unwrap();
    d.host.content_ready(vec!["two".into()], end).unwrap();
    d.client.advance(end);

    assert_eq!(d.client.status(), Status::Finished);
    assert_eq!(d.client.analysis(), Some(&results));
    assert_eq!(d.client.session().sentences, vec!["one"]);

    // once the client asks for another race, the next INIT is taken
    d.client.restart(end).unwrap();
    d.host.end_session(end);
    d.host.restart(end).unwrap();
    d.host.start_session(Difficulty::Hard).unwrap();
    d.host.content_ready(vec!["three".into()], end).unwrap();
    d.client.advance(end);

    assert_eq!(d.client.status(), Status::Playing);
    assert_eq!(d.client.session().sentences, vec!["three"]);
}
