mod common;

use applet_session::{AppletState, ControlSecurity, Dispatcher, PrimaryExit};
use common::{RecordingEngine, LOAD};
use launcher_ipc::{error_codes, ControlServer, FramedTransport, OpCode, ShutdownSignal};
use launcher_storage::{MemoryStorage, TokenManager};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn tokens() -> Arc<TokenManager> {
    Arc::new(TokenManager::new(Arc::new(MemoryStorage::new()), 30))
}

async fn serve(dispatcher: &Dispatcher) -> SocketAddr {
    let server = ControlServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(
        dispatcher.control_handler(),
        dispatcher.shutdown_signal().clone(),
    ));
    addr
}

async fn exchange(addr: SocketAddr, message: &[u8]) -> Option<Value> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(message).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    if reply.is_empty() {
        return None;
    }
    assert_eq!(reply.last(), Some(&b'\n'));
    Some(serde_json::from_slice(&reply).unwrap())
}

fn sealed(tokens: &TokenManager, command: &str) -> Vec<u8> {
    let key = tokens.get_active_key().unwrap();
    envelope_crypto::seal(command.as_bytes(), &key)
        .unwrap()
        .to_json()
        .unwrap()
        .into_bytes()
}

#[tokio::test]
async fn racing_loads_run_the_engine_once() {
    const CLIENTS: usize = 8;

    let tokens = tokens();
    let engine = Arc::new(RecordingEngine::new().with_delay(Duration::from_millis(50)));
    let d = Dispatcher::new(
        engine.clone(),
        ControlSecurity::Envelope(tokens.clone()),
        ShutdownSignal::new(),
    );
    let addr = serve(&d).await;

    let message = sealed(&tokens, LOAD);
    let clients: Vec<_> = (0..CLIENTS)
        .map(|_| {
            let message = message.clone();
            tokio::spawn(async move { exchange(addr, &message).await })
        })
        .collect();

    let mut successes = 0;
    let mut rejections = 0;
    for client in clients {
        let reply = client.await.unwrap().expect("every sealed command gets a reply");
        if reply["status"] == "success" {
            successes += 1;
        } else {
            assert_eq!(reply["errorCode"], error_codes::INVALID_TRANSITION);
            rejections += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(rejections, CLIENTS - 1);
    assert_eq!(engine.count(OpCode::Load), 1);
    assert_eq!(d.session().state().await, AppletState::Loaded);
}

#[tokio::test]
async fn tampered_envelopes_are_dropped_silently() {
    let tokens = tokens();
    let engine = Arc::new(RecordingEngine::new());
    let d = Dispatcher::new(
        engine.clone(),
        ControlSecurity::Envelope(tokens.clone()),
        ShutdownSignal::new(),
    );
    let addr = serve(&d).await;

    let key = tokens.get_active_key().unwrap();
    let mut envelope = envelope_crypto::seal(LOAD.as_bytes(), &key).unwrap();
    let replacement = if envelope.mac.starts_with('A') { "B" } else { "A" };
    envelope.mac.replace_range(0..1, replacement);
    assert!(exchange(addr, envelope.to_json().unwrap().as_bytes()).await.is_none());

    let wrong_key = envelope_crypto::generate_key().unwrap();
    let foreign = envelope_crypto::seal(LOAD.as_bytes(), &wrong_key).unwrap();
    assert!(exchange(addr, foreign.to_json().unwrap().as_bytes()).await.is_none());

    assert!(exchange(addr, LOAD.as_bytes()).await.is_none());
    assert!(exchange(addr, b"garbage").await.is_none());

    assert!(engine.calls().is_empty());
    assert_eq!(d.session().state().await, AppletState::Uninitialized);
}

#[tokio::test]
async fn sealed_garbage_is_dropped() {
    let tokens = tokens();
    let engine = Arc::new(RecordingEngine::new());
    let d = Dispatcher::new(
        engine.clone(),
        ControlSecurity::Envelope(tokens.clone()),
        ShutdownSignal::new(),
    );
    let addr = serve(&d).await;

    assert!(exchange(addr, &sealed(&tokens, "[not a command]")).await.is_none());
    let reply = exchange(addr, &sealed(&tokens, r#"{"op":"resize"}"#)).await.unwrap();
    assert_eq!(reply["errorCode"], error_codes::UNSUPPORTED_OPERATION);
}

#[tokio::test]
async fn plain_mode_accepts_bare_json() {
    let engine = Arc::new(RecordingEngine::new());
    let d = Dispatcher::new(engine.clone(), ControlSecurity::Plain, ShutdownSignal::new());
    let addr = serve(&d).await;

    let reply = exchange(addr, LOAD.as_bytes()).await.unwrap();
    assert_eq!(reply["status"], "success");

    let reply = exchange(addr, LOAD.as_bytes()).await.unwrap();
    assert_eq!(reply["errorCode"], error_codes::INVALID_TRANSITION);
}

#[tokio::test]
async fn control_unload_stops_the_primary_loop() {
    let tokens = tokens();
    let engine = Arc::new(RecordingEngine::new());
    let d = Dispatcher::new(
        engine.clone(),
        ControlSecurity::Envelope(tokens.clone()),
        ShutdownSignal::new(),
    );
    let addr = serve(&d).await;

    // The client end stays open so the loop is parked in a read
    let (client, host) = tokio::io::duplex(16 * 1024);
    let (host_read, host_write) = tokio::io::split(host);
    let primary = {
        let d = d.clone();
        tokio::spawn(async move {
            let mut transport = FramedTransport::new(host_read, host_write);
            d.run_primary_loop(&mut transport).await
        })
    };

    let reply = exchange(addr, &sealed(&tokens, LOAD)).await.unwrap();
    assert_eq!(reply["status"], "success");
    let reply = exchange(addr, &sealed(&tokens, r#"{"op":"unload"}"#)).await.unwrap();
    assert_eq!(reply["status"], "success");

    let exit = tokio::time::timeout(Duration::from_secs(5), primary)
        .await
        .expect("primary loop ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(exit, PrimaryExit::Shutdown);
    assert_eq!(engine.count(OpCode::Unload), 1);
    drop(client);
}
