use crate::{ServerScript, TestEnvironment, PASSWORD, USERNAME};

use ftp::{ReplyCode, SessionConfig, SessionError, SessionState};

#[test]
fn test_simple_login() {
    let mut env = TestEnvironment::new();
    let (mut session, console) = env.connected_session(SessionConfig::default());
    assert_eq!(session.state(), SessionState::LoggingIn);
    assert!(!session.is_logged_in());
    assert_eq!(session.host(), Some("127.0.0.1"));
    assert_eq!(session.port(), env.server_addr.port());

    let reply = session.login(USERNAME, Some(PASSWORD)).unwrap();
    assert!(reply.is(ReplyCode::UserLoggedIn));
    assert!(session.is_logged_in());
    assert_eq!(session.state(), SessionState::Ready);

    drop(session);
    env.finish();
    assert_eq!(env.received(), vec!["USER cs472", "PASS hw2ftp", "QUIT"]);
    let transcript = console.transcript();
    assert!(transcript.contains(&"Sent: PASS ****".to_owned()));
    assert!(transcript.iter().all(|line| !line.contains(PASSWORD)));
}

#[test]
fn test_wrong_credentials() {
    let env = TestEnvironment::new();
    let (mut session, _) = env.connected_session(SessionConfig::default());
    let reply = session.login("this user", Some("does not exists")).unwrap();
    assert!(reply.is(ReplyCode::NotLoggedIn));
    assert!(!session.is_logged_in());
    assert!(session.is_connected());
    assert_ne!(session.state(), SessionState::Ready);
}

#[test]
fn test_missing_password_ends_session() {
    let mut env = TestEnvironment::new();
    let (mut session, _) = env.connected_session(SessionConfig::default());
    let err = session.login(USERNAME, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::CredentialsRequired)
    ));
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Closed);
    env.finish();
    assert_eq!(env.received_verbs(), vec!["USER", "QUIT"]);
}

#[test]
fn test_banner_noise_is_skipped() {
    let script = ServerScript {
        greeting: vec![
            "120 Service ready in 1 minute.".to_owned(),
            "Welcome, friend!".to_owned(),
        ],
        ..ServerScript::default()
    };
    let env = TestEnvironment::with_script(script);
    let (mut session, console) = env.session(SessionConfig::default());
    session.connect("127.0.0.1", env.server_addr.port()).unwrap();
    assert_eq!(session.state(), SessionState::AwaitingBanner);
    let banner = session.await_ready().unwrap();
    assert_eq!(banner.code, 220);
    assert!(console
        .shown()
        .contains(&"Unrecognized server reply ignored.".to_owned()));
    assert!(console
        .shown()
        .contains(&"120 Service ready in 1 minute.".to_owned()));
}
