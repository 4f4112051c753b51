use std::time::{Duration, Instant};

use crate::{ServerScript, TestEnvironment};

use ftp::{ConnectionMode, DataConnectError, Dispatcher, Flow, SessionConfig, SessionState};

fn quiet(mode: ConnectionMode) -> SessionConfig {
    SessionConfig {
        verbose: false,
        mode,
        ..SessionConfig::default()
    }
}

fn list_in_mode(mode: ConnectionMode, verb: &str) {
    let mut env = TestEnvironment::new();
    env.create_file("1", b"");
    env.create_file("2", b"");
    env.create_file("3", b"");
    let (mut session, console) = env.logged_in_session(quiet(mode));
    session.list("").unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let shown = console.shown();
    assert_eq!(shown.len(), 1, "{:?}", shown);
    let names: Vec<&str> = shown[0]
        .lines()
        .map(|line| line.rsplit(' ').next().unwrap())
        .collect();
    assert_eq!(names, vec!["1", "2", "3"]);

    drop(session);
    env.finish();
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", verb, "LIST", "QUIT"]);
}

#[test]
fn test_list_passive() {
    list_in_mode(ConnectionMode::Passive, "PASV");
}

#[test]
fn test_list_extended_passive() {
    list_in_mode(ConnectionMode::ExtendedPassive, "EPSV");
}

#[test]
fn test_list_active() {
    list_in_mode(ConnectionMode::Active, "PORT");
}

#[test]
fn test_list_extended_active() {
    list_in_mode(ConnectionMode::ExtendedActive, "EPRT");
}

#[test]
fn test_port_command_uses_listening_port() {
    let mut env = TestEnvironment::new();
    let (mut session, _) = env.logged_in_session(quiet(ConnectionMode::Active));
    session.list("").unwrap();
    drop(session);
    env.finish();
    let port_line = env
        .received()
        .into_iter()
        .find(|line| line.starts_with("PORT "))
        .unwrap();
    let fields: Vec<u16> = port_line[5..]
        .split(',')
        .map(|field| field.parse().unwrap())
        .collect();
    assert_eq!(&fields[..4], &[127, 0, 0, 1]);
    let port = fields[4] * 256 + fields[5];
    assert!((50000..60000).contains(&port));
}

#[test]
fn test_file_receiving() {
    let env = TestEnvironment::new();
    let filename = "a_very_important_file_with_a_very_long_name.txt";
    let text = "Hello World!";
    env.create_file(filename, text.as_bytes());
    let (session, console) = env.logged_in_session(quiet(ConnectionMode::Passive));
    let mut dispatcher = Dispatcher::new(session);
    let line = format!("get {} copy.txt", filename);
    assert_eq!(dispatcher.execute(&line).unwrap(), Flow::Continue);
    assert_eq!(env.local_file("copy.txt"), text.as_bytes());
    assert_eq!(console.shown(), vec!["12 bytes received into copy.txt."]);
}

#[test]
fn test_file_sending_active() {
    let env = TestEnvironment::new();
    let contents = "random garbage people store in text files";
    env.create_local_file("notes.txt", contents.as_bytes());
    let (session, console) = env.logged_in_session(quiet(ConnectionMode::Active));
    console.answer("uploaded.txt");
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("put notes.txt").unwrap(), Flow::Continue);
    // The transfer is only acknowledged after the server stored the file.
    assert_eq!(env.server_file("uploaded.txt"), contents.as_bytes());
    assert_eq!(console.shown(), vec!["41 bytes sent to uploaded.txt."]);
}

#[test]
fn test_missing_local_file_is_reported_before_any_transfer() {
    let env = TestEnvironment::new();
    let (session, console) = env.logged_in_session(quiet(ConnectionMode::Passive));
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("put absent.txt there.txt").unwrap(), Flow::Continue);
    dispatcher.execute("pwd").unwrap();
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", "PWD"]);
    assert_eq!(console.shown().len(), 2);
}

#[test]
fn test_refused_download() {
    let env = TestEnvironment::new();
    let (mut session, console) = env.logged_in_session(quiet(ConnectionMode::ExtendedPassive));
    session.retr("missing.txt", "missing.txt").unwrap();
    assert_eq!(console.shown(), vec!["550 Failed to open file."]);
    assert!(!env.local.path().join("missing.txt").exists());
    assert_eq!(session.pwd().unwrap().code, 257);
}

#[test]
fn test_combined_transfer_replies() {
    let script = ServerScript {
        combine_replies: true,
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    env.create_file("readme.txt", b"read me");
    let (mut session, console) = env.logged_in_session(quiet(ConnectionMode::Passive));
    session.retr("readme.txt", "readme.txt").unwrap();
    assert_eq!(env.local_file("readme.txt"), b"read me");
    // The next reply must belong to the next command.
    assert_eq!(session.pwd().unwrap().code, 257);
    assert_eq!(
        console.shown(),
        vec!["7 bytes received into readme.txt.", "/"]
    );
}

#[test]
fn test_passive_disabled_by_server() {
    let script = ServerScript {
        disabled: vec!["PASV".to_owned()],
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let (session, console) = env.logged_in_session(quiet(ConnectionMode::Passive));
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("ls").unwrap(), Flow::Continue);
    assert_eq!(console.shown(), vec!["PASV disabled by server."]);
    assert!(dispatcher.session().is_connected());

    dispatcher.execute("epsv").unwrap();
    dispatcher.execute("ls").unwrap();
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", "PASV", "EPSV", "LIST"]);
}

#[test]
fn test_port_disabled_by_server() {
    let script = ServerScript {
        disabled: vec!["PORT".to_owned(), "EPRT".to_owned()],
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let (mut session, console) = env.logged_in_session(quiet(ConnectionMode::Active));
    let err = session.list("").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataConnectError>(),
        Some(DataConnectError::Disabled("PORT"))
    ));
    session.toggle_mode(ConnectionMode::ExtendedActive);
    let err = session.list("").unwrap_err();
    assert_eq!(err.to_string(), "EPRT disabled by server.");
    assert_eq!(console.shown(), vec!["EPRT mode enabled."]);
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", "PORT", "EPRT"]);
}

#[test]
fn test_server_never_connects_back() {
    // The 425 arrives only after the client stopped waiting.
    let script = ServerScript {
        connect_back: false,
        decline_delay: Duration::from_millis(1500),
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let config = SessionConfig {
        accept_timeout: Duration::from_secs(1),
        ..quiet(ConnectionMode::Active)
    };
    let (mut session, console) = env.logged_in_session(config);

    let start = Instant::now();
    let err = session.list("").unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        err.downcast_ref::<DataConnectError>(),
        Some(DataConnectError::AcceptTimeout(_))
    ));
    assert!(session.is_connected());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.pwd().unwrap().code, 257);
    assert_eq!(console.shown(), vec!["/"]);
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", "PORT", "LIST", "PWD"]);
}
