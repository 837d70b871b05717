//! TCP listener: one task per connection, line-delimited JSON both ways.
//!
//! ```text
//! client ──line──▶ Inbound::parse ─▶ dispatch ─▶ SchedulerHandle
//!        ◀─line── reply (TTS_QUEUED | RESULT | QUEUE_UPDATE | ERROR)
//!        ◀─line── broadcast Outbound (QUEUE_UPDATE, PLAY, HISTORY_ADDED, ACTION)
//! ```

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use crate::actions::DoAction;
use crate::pipeline::{EnqueueRequest, SchedulerError, SchedulerEvent, SchedulerHandle};

use super::protocol::{Inbound, Outbound};

/// Capacity of the per-client broadcast buffer.
pub const BROADCAST_CAPACITY: usize = 256;

/// Accept connections until the listener fails.
pub async fn serve(
    listener: TcpListener,
    handle: SchedulerHandle,
    outbound: broadcast::Sender<Outbound>,
) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        log::info!("server: client connected from {peer}");

        let handle = handle.clone();
        let events = outbound.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, handle, events).await {
                log::warn!("server: connection {peer} ended with error: {e:#}");
            }
            log::info!("server: client {peer} disconnected");
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    handle: SchedulerHandle,
    mut events: broadcast::Receiver<Outbound>,
) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => {
                if read.context("reading from client")? == 0 {
                    return Ok(());
                }
                let reply = match std::str::from_utf8(&buf) {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(dispatch(&handle, line).await),
                    Err(e) => {
                        log::debug!("server: rejected non-UTF-8 line: {e}");
                        Some(Outbound::error(format!("malformed message: {e}")))
                    }
                };
                buf.clear();
                if let Some(reply) = reply {
                    send(&mut write, &reply).await?;
                }
            }
            event = events.recv() => match event {
                Ok(message) => send(&mut write, &message).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("server: slow client skipped {skipped} message(s)");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(write: &mut W, message: &Outbound) -> Result<()> {
    let line = message.to_line().context("serializing message")?;
    write
        .write_all(line.as_bytes())
        .await
        .context("writing to client")
}

/// Handle one inbound line and produce the direct reply.
pub async fn dispatch(handle: &SchedulerHandle, line: &str) -> Outbound {
    let message = match Inbound::parse(line) {
        Ok(message) => message,
        Err(e) => {
            log::debug!("server: rejected line: {e}");
            return Outbound::error(e.to_string());
        }
    };

    let result = match message {
        Inbound::Tts {
            text,
            alias,
            username,
            redemption_id,
            reward_id,
        } => {
            let request = EnqueueRequest {
                text,
                alias,
                username,
                redemption_id,
                reward_id,
            };
            return match handle.enqueue(request).await {
                Ok(ack) => Outbound::queued(ack.id, ack.position),
                Err(e) => Outbound::error(e.to_string()),
            };
        }
        Inbound::Queue => {
            return match handle.snapshot().await {
                Ok(snapshot) => Outbound::QueueUpdate { snapshot },
                Err(e) => Outbound::error(e.to_string()),
            };
        }
        Inbound::PlaybackFinished { id, duration_ms } => {
            handle.playback_finished(id, duration_ms).await
        }
        Inbound::Pause => handle.pause().await,
        Inbound::Resume => handle.resume().await,
        Inbound::Clear => handle.clear().await,
        Inbound::Cancel { id } => handle.cancel(id).await,
        Inbound::Moderate {
            id,
            action,
            position,
        } => handle.moderate(id, action.into_action(position)).await,
        Inbound::Replay {
            id,
            position,
            use_show_hide,
        } => {
            return match handle
                .replay(id, position.unwrap_or_default(), use_show_hide.unwrap_or(false))
                .await
            {
                Ok(new_id) => Outbound::Result {
                    success: true,
                    message: None,
                    id: Some(new_id),
                },
                Err(e) => reply_error(e),
            };
        }
        Inbound::Refund { id } => match handle.refund_history(id).await {
            Ok(true) => Ok(()),
            Ok(false) => return Outbound::failed("Refund could not be sent"),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => Outbound::ok(),
        Err(e) => reply_error(e),
    }
}

fn reply_error(e: SchedulerError) -> Outbound {
    match e {
        SchedulerError::Closed => Outbound::error(e.to_string()),
        other => Outbound::failed(other.to_string()),
    }
}

/// Forward scheduler events and action requests to every client.
pub async fn pump(
    mut events: mpsc::UnboundedReceiver<SchedulerEvent>,
    mut actions: mpsc::UnboundedReceiver<DoAction>,
    outbound: broadcast::Sender<Outbound>,
) {
    loop {
        let message: Outbound = tokio::select! {
            Some(event) = events.recv() => event.into(),
            Some(action) = actions.recv() => action.into(),
            else => break,
        };
        // No subscribers is fine; nobody is connected yet.
        let _ = outbound.send(message);
    }
    log::info!("server: event sources closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::actions::{OverlayActuator, RefundActuator, RefundRequest};
    use crate::config::{AppConfig, VoiceProfile};
    use crate::pipeline::{HistoryLog, Scheduler, SchedulerDeps};
    use crate::tts::{SpeechSynthesizer, SynthesisError, SynthesizedAudio};

    struct SilentSynth;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceProfile,
        ) -> Result<SynthesizedAudio, SynthesisError> {
            Ok(SynthesizedAudio::default())
        }

        async fn fetch_history_audio(&self, _id: &str) -> Result<Vec<u8>, SynthesisError> {
            Err(SynthesisError::MissingApiKey)
        }
    }

    struct Nothing;

    #[async_trait]
    impl OverlayActuator for Nothing {
        async fn show(&self, _text: &str) {}
        async fn hide(&self) {}
    }

    #[async_trait]
    impl RefundActuator for Nothing {
        async fn refund(&self, _request: &RefundRequest) -> bool {
            false
        }
    }

    fn scheduler() -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let deps = SchedulerDeps {
            moderator: None,
            synthesizer: Arc::new(SilentSynth),
            overlay: Arc::new(Nothing),
            refunds: Arc::new(Nothing),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new(
            Arc::new(AppConfig::default()),
            deps,
            HistoryLog::new(10, None),
            tx,
        )
        .spawn();
        (handle, rx)
    }

    #[tokio::test]
    async fn dispatch_acknowledges_tts() {
        let (handle, _events) = scheduler();
        handle.pause().await.unwrap();
        let reply = dispatch(&handle, r#"{"type":"TTS","text":"hello"}"#).await;
        match reply {
            Outbound::TtsQueued {
                position, status, ..
            } => {
                assert_eq!(position, 1);
                assert_eq!(status, "queued");
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_reports_errors_without_failing() {
        let (handle, _events) = scheduler();
        assert!(matches!(
            dispatch(&handle, "{oops").await,
            Outbound::Error { .. }
        ));

        let missing = uuid::Uuid::new_v4();
        let reply = dispatch(&handle, &format!(r#"{{"type":"CANCEL","id":"{missing}"}}"#)).await;
        match reply {
            Outbound::Result {
                success, message, ..
            } => {
                assert!(!success);
                assert!(message.unwrap().contains("not found"));
            }
            other => panic!("unexpected reply {other:?}"),
        }

        assert_eq!(dispatch(&handle, r#"{"type":"PAUSE"}"#).await, Outbound::ok());
        match dispatch(&handle, r#"{"type":"QUEUE"}"#).await {
            Outbound::QueueUpdate { snapshot } => assert!(snapshot.is_paused),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn tcp_round_trip_keeps_connection_after_bad_line() {
        let (handle, _events) = scheduler();
        handle.pause().await.unwrap();
        let (outbound, _) = broadcast::channel(BROADCAST_CAPACITY);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, handle, outbound));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"garbage\n").await.unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["type"], "ERROR");

        write
            .write_all(b"{\"type\":\"TTS\",\"text\":\"hi there\"}\n")
            .await
            .unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["type"], "TTS_QUEUED");
        assert_eq!(reply["status"], "queued");
    }

    #[tokio::test]
    async fn non_utf8_line_gets_error_and_connection_survives() {
        let (handle, _events) = scheduler();
        let (outbound, _) = broadcast::channel(BROADCAST_CAPACITY);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, handle, outbound));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"\xff\xfe\n").await.unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["type"], "ERROR");

        write.write_all(b"{\"type\":\"QUEUE\"}\n").await.unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["type"], "QUEUE_UPDATE");
    }

    #[tokio::test]
    async fn pump_fans_out_events_and_actions() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (outbound, mut rx) = broadcast::channel(BROADCAST_CAPACITY);
        tokio::spawn(pump(events_rx, actions_rx, outbound));

        actions_tx
            .send(DoAction {
                request: "DoAction",
                id: "hide-1".into(),
                action: crate::actions::ActionRef { id: "h".into() },
                args: None,
            })
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), Outbound::Action { .. }));

        events_tx
            .send(SchedulerEvent::Play {
                id: uuid::Uuid::new_v4(),
                audio: vec![1],
                volume: 50,
            })
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), Outbound::Play { volume: 50, .. }));
    }
}
