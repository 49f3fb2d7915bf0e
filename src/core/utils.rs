use std::sync::Arc;

use snafu::location;
use tokio::task::JoinSet;

use crate::error::{Error, Result};

use super::codec::{encode, MessageKind};
use super::member::Member;
use super::transport::TransportLayer;

/// Encodes `payload` as `kind` and sends it to the self-reported address of `target`.
pub(crate) async fn send_message<T: TransportLayer>(
    socket: &T,
    kind: MessageKind,
    payload: &Member,
    target: &Member,
) -> Result<()> {
    let addr = target.socket_addr()?;
    let buf = encode(kind, payload);

    socket
        .send_to(&buf, addr)
        .await
        .map_err(|e| Error::Send {
            target: format!("{}@{addr}", target.identifier()),
            message: e.to_string(),
            location: location!(),
        })?;

    Ok(())
}

/// Sends the same message to every target concurrently.
///
/// A failed send is logged and does not affect the others. Returns the number of
/// successful sends.
pub(crate) async fn fan_out<T: TransportLayer>(
    from: &str,
    socket: &Arc<T>,
    kind: MessageKind,
    payload: &Member,
    targets: Vec<Member>,
) -> usize {
    let mut tasks = JoinSet::new();

    for target in targets {
        let socket = socket.clone();
        let payload = payload.clone();
        tasks.spawn(async move {
            send_message(&*socket, kind, &payload, &target)
                .await
                .map(|_| target.identifier())
        });
    }

    let mut sent = 0;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(target)) => {
                tracing::debug!("[{}] sent {:?} to {}", from, kind, target);
                sent += 1;
            }
            Ok(Err(e)) => tracing::warn!("[{}] failed to send {:?}: {}", from, kind, e),
            Err(e) => tracing::warn!("[{}] send task for {:?} aborted: {}", from, kind, e),
        }
    }

    sent
}
