//! Helpers shared by unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Serves `app` on an ephemeral local port and returns its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    format!("http://{}", addr)
}

/// Commands received by a [`spawn_redis_stub`] server, in arrival order
pub type RedisCommands = Arc<Mutex<Vec<Vec<String>>>>;

/// Minimal RESP server: answers `GET` from memory, stores `SETEX`/`SET`, and
/// replies `+OK` to anything else. Each command is delayed by `delay`.
///
/// Returns the `redis://` URL and the log of received commands.
pub async fn spawn_redis_stub(delay: Duration) -> (String, RedisCommands) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind redis stub");
    let addr = listener.local_addr().expect("redis stub address");
    let commands: RedisCommands = Arc::default();
    let store: Arc<Mutex<HashMap<String, String>>> = Arc::default();

    let log = commands.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let log = log.clone();
            let store = store.clone();
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);
                while let Some(command) = read_command(&mut reader).await {
                    tokio::time::sleep(delay).await;
                    let reply = respond(&command, &store);
                    log.lock().expect("command log").push(command);
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (format!("redis://{}", addr), commands)
}

async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        parts.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(parts)
}

fn respond(command: &[String], store: &Mutex<HashMap<String, String>>) -> String {
    let mut store = store.lock().expect("redis stub store");
    match command.first().map(|c| c.to_ascii_uppercase()).as_deref() {
        Some("GET") => match command.get(1).and_then(|key| store.get(key)) {
            Some(value) => format!("${}\r\n{}\r\n", value.len(), value),
            None => "$-1\r\n".to_string(),
        },
        Some("SETEX") if command.len() == 4 => {
            store.insert(command[1].clone(), command[3].clone());
            "+OK\r\n".to_string()
        }
        Some("SET") if command.len() >= 3 => {
            store.insert(command[1].clone(), command[2].clone());
            "+OK\r\n".to_string()
        }
        _ => "+OK\r\n".to_string(),
    }
}
