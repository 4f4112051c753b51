use crate::{ServerScript, TestEnvironment, PASSWORD, USERNAME};

use ftp::{Dispatcher, Flow, SessionConfig, SessionError, SessionState};

fn quiet() -> SessionConfig {
    SessionConfig {
        verbose: false,
        ..SessionConfig::default()
    }
}

#[test]
fn test_printing_working_directory() {
    let env = TestEnvironment::new();
    let (mut session, console) = env.logged_in_session(quiet());
    let reply = session.pwd().unwrap();
    assert_eq!(reply.code, 257);
    assert_eq!(console.shown(), vec!["/"]);
}

#[test]
fn test_verbose_replies_are_shown_once() {
    let env = TestEnvironment::new();
    let (mut session, console) = env.logged_in_session(SessionConfig::default());
    console.shown.borrow_mut().clear();
    session.syst().unwrap();
    assert_eq!(console.shown(), vec!["215 UNIX Type: L8"]);
}

#[test]
fn test_changing_directory() {
    let env = TestEnvironment::new();
    env.create_dir("docs");
    let (mut session, console) = env.logged_in_session(quiet());
    assert_eq!(session.cwd("docs").unwrap().code, 250);
    assert_eq!(session.cwd("nowhere").unwrap().code, 550);
    session.pwd().unwrap();
    assert_eq!(
        console.shown(),
        vec![
            "250 Directory successfully changed.",
            "550 Failed to change directory.",
            "/docs"
        ]
    );
}

#[test]
fn test_system_and_remote_help() {
    let env = TestEnvironment::new();
    let (session, console) = env.logged_in_session(quiet());
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("system").unwrap(), Flow::Continue);
    assert_eq!(dispatcher.execute("remotehelp").unwrap(), Flow::Continue);
    assert_eq!(
        console.shown(),
        vec!["215 UNIX Type: L8", "214 The following commands are recognized."]
    );
    assert_eq!(dispatcher.session().state(), SessionState::Ready);
}

#[test]
fn test_connect_and_quit() {
    let mut env = TestEnvironment::new();
    let (session, _) = env.logged_in_session(SessionConfig::default());
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("quit").unwrap(), Flow::Quit);
    assert_eq!(dispatcher.session().state(), SessionState::Closed);
    assert!(!dispatcher.session().is_connected());
    env.finish();
    assert_eq!(env.received_verbs().last().unwrap(), "QUIT");
}

#[test]
fn test_bad_paths_never_reach_the_server() {
    let env = TestEnvironment::new();
    let (session, console) = env.logged_in_session(quiet());
    console.answer("remote file.txt");
    console.answer("local file.txt");
    let mut dispatcher = Dispatcher::new(session);
    assert_eq!(dispatcher.execute("get").unwrap(), Flow::Continue);
    console.answer("");
    assert_eq!(dispatcher.execute("put local.txt").unwrap(), Flow::Continue);

    // A command that round trips proves the server saw everything sent so far.
    dispatcher.execute("pwd").unwrap();
    assert_eq!(env.received_verbs(), vec!["USER", "PASS", "PWD"]);
    let shown = console.shown();
    assert!(shown[0].starts_with("Usage: get"));
    assert!(shown[1].starts_with("Usage: put"));
}

#[test]
fn test_lost_connection_terminates_session() {
    let script = ServerScript {
        hang_up_on: Some("SYST".to_owned()),
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let (session, console) = env.logged_in_session(quiet());
    let mut dispatcher = Dispatcher::new(session);
    let err = dispatcher.execute("system").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::Terminated(_))
    ));
    assert_eq!(dispatcher.session().state(), SessionState::Closed);
    assert!(console.shown().last().unwrap().starts_with("Session terminated"));

    assert_eq!(dispatcher.execute("pwd").unwrap(), Flow::Continue);
    assert_eq!(console.shown().last().unwrap(), "Not connected.");
}

#[test]
fn test_service_closing_notice() {
    let script = ServerScript {
        canned: vec![("SYST".to_owned(), "421 Timeout.".to_owned())],
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let (mut session, console) = env.logged_in_session(quiet());
    let reply = session.syst().unwrap();
    assert_eq!(reply.code, 421);
    assert_eq!(
        console.shown(),
        vec!["Connection closing: Timeout.", "421 Timeout."]
    );
}

#[test]
fn test_raw_command_lines() {
    let env = TestEnvironment::new();
    env.create_dir("docs");
    let (mut session, console) = env.logged_in_session(SessionConfig::default());
    session.send_command("SYST", "").unwrap();
    assert_eq!(session.get_reply().unwrap().unwrap().code, 215);
    session.send_command("CWD", "docs").unwrap();
    assert_eq!(session.get_reply().unwrap().unwrap().code, 250);
    session.send_command("PASS", "not the password").unwrap();
    assert_eq!(session.get_reply().unwrap().unwrap().code, 530);

    assert_eq!(
        env.received(),
        vec![
            format!("USER {}", USERNAME),
            format!("PASS {}", PASSWORD),
            "SYST".to_owned(),
            "CWD docs".to_owned(),
            "PASS not the password".to_owned(),
        ]
    );
    let transcript = console.transcript();
    assert!(transcript.contains(&"Sent: SYST".to_owned()));
    assert!(transcript.contains(&"Sent: CWD docs".to_owned()));
    assert!(transcript.iter().all(|line| !line.contains("not the password")));
}
